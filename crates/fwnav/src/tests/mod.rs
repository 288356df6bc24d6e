
mod query_tests;
