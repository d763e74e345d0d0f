// SPDX-License-Identifier: MIT

//! canvas-rs - node-graph image workflows
//!
//! - [kit] - storage, providers, transforms, configuration and errors
//! - [canvas] - the workflow engine and its HTTP front end

pub mod canvas;
pub mod kit;
