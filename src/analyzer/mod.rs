//! # Analyzer Module
//!
//! Static and live analysis of Kubernetes access control.

pub mod rbac;
