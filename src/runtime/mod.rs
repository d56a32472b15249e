//! Runtime system
//!
//! This module contains the work-stealing task scheduler.

pub mod scheduler;
