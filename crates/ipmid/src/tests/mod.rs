//! Test suites for the IPMI router daemon.

mod behaviour;
mod support;
