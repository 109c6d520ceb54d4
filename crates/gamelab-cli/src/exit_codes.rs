//! Exit codes of the gamelab binary
//!
//! Follows sysexits.h where a matching code exists.

#![allow(dead_code)]

/// Success - every stage completed
pub const SUCCESS: i32 = 0;

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Manifest error - a manifest could not be found, rendered or parsed
pub const MANIFEST_ERROR: i32 = 3;

/// Cluster error - an apply, wait or remote command failed for good
pub const CLUSTER_ERROR: i32 = 4;

/// IO error - file not readable, permission denied, etc.
pub const IO_ERROR: i32 = 5;

/// Usage error - invalid arguments or options
pub const USAGE_ERROR: i32 = 64;

/// Configuration error - missing or invalid lab configuration
pub const CONFIG_ERROR: i32 = 78;
