//! CPU pinning for containers through the cpuset cgroup controller.
//! The policy is read from the annotations of an OCI runtime spec and written
//! to the container's cgroup on cgroup v1, hybrid and unified hosts.
#[cfg(test)]
#[macro_use]
extern crate quickcheck;


pub mod common;
pub mod cpuset;
pub mod hook;
pub mod path;
pub mod policy;
pub mod spec;
mod systemd;
