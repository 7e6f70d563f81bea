//! Outbound ports (driven side): interfaces implemented by outbound adapters.
//!
//! These contracts describe infrastructure dependencies: the cluster, the
//! image build toolchain, source control and time.

pub mod builder;
pub mod cluster;
pub mod sleeper;
pub mod source;
