// Each integration test binary uses a different subset of these
#![allow(dead_code)]

pub mod http_stub;
pub mod polling;
pub mod process;
