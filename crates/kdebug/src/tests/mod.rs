// Unit tests for the key-filtered debug channel.
//
// Output rendering goes through the globally registered sink and is covered by
// the integration test in `tests/macros.rs`; these tests exercise the filter
// state on local `DebugCore` instances.

use crate::DebugCore;
