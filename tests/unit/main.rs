//! Unit test target.

mod cadence_test;
