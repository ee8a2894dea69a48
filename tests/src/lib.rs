//! fastswap testing framework
//!
//! Fixtures for exercising reloads against a real [`EmbeddedHost`] without a
//! primary thread or a terminal:
//! - [`RecordingRequester`] captures every notice
//! - [`CountingHost`] counts native calls and injects failures
//! - [`InlineScheduler`] runs primary-thread tasks on the caller
//! - [`ModuleDir`] writes, touches and corrupts archives
//!
//! [`EmbeddedHost`]: fastswap_runtime::EmbeddedHost

pub mod fixtures;
pub mod host;
pub mod scheduler;

pub use fixtures::{ModuleDir, manifest};
pub use host::{CountingHost, HostCalls};
pub use requester::RecordingRequester;
pub use scheduler::InlineScheduler;

#[macro_export]
macro_rules! assert_notified {
    ($requester:expr, $notice:expr, $fragment:expr) => {
        assert!(
            $requester.saw($notice, $fragment),
            "Expected {:?} notice containing {:?}, got {:?}",
            $notice,
            $fragment,
            $requester.notices()
        );
    };
}
