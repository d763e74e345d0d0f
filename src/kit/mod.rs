// SPDX-License-Identifier: MIT

//! Building blocks shared by the workflow engine and its front ends
//!
//! - [config] - settings loaded from the environment
//! - [error] - error taxonomy
//! - [provider] - external image generation backends
//! - [storage] - upload root, derived file names and public URLs
//! - [transform] - local image operations

pub mod config;
pub mod error;
pub mod provider;
pub mod storage;
pub mod transform;
