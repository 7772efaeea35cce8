mod test_fixtures;

pub use test_fixtures::*;
