//! Integration tests for dropmirror-remote
//!
//! Uses wiremock to simulate the delta feed service and verifies
//! end-to-end behavior of the DeltaClient, delta pulls, long-polls
//! and file downloads.


mod test_delta;
mod test_files;
mod test_longpoll;
