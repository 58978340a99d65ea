//! Test suites for the component registry

mod ordering;
