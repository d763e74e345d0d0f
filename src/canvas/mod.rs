// SPDX-License-Identifier: MIT

pub mod server;
pub mod workflow;
