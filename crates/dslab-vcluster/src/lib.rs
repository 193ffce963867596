#![doc = include_str!("../readme.md")]

pub mod allocation_engine;
pub mod cluster;
pub mod common;
pub mod config;
pub mod datacenter;
pub mod error;
pub mod host;
pub mod pe;
pub mod trace;
pub mod vm;
pub mod vm_allocation_policies;
pub mod vm_allocation_policy;
