// Copyright 2025 sockrpc Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # sockrpc CLI
//!
//! Command-line front end for talking to a JSON-RPC node over a persistent
//! socket.
//!
//! ## Key Commands
//!
//! - `sockrpc call`: send one request and print the raw JSON result
//! - `sockrpc subscribe`: open a subscription and print each push as a JSON line
//!
//! Endpoints are `tcp://host:port`, `ipc:///path/to/socket` or a bare socket
//! path. The command implementations live in [`session`] so they can be
//! driven from tests without spawning the binary.

pub mod session;
