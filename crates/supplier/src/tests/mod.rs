//! Behavioural suites for the supplier pipeline.

mod support;
