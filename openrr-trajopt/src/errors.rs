/*
Copyright 2017 Takashi Ogura

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

use std::io;

use thiserror::Error;

/// Error for `openrr_trajopt`
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("{}", error)]
    Other { error: String },
    #[error("Node name {} not found", .0)]
    NotFound(String),
    #[error("DoF mismatch {} != {}", .0, .1)]
    DofMismatch(usize, usize),
    #[error("Variable index {} is out of range (len = {})", index, len)]
    VarOutOfRange { index: usize, len: usize },
    #[error("Invalid term {}: {}", name, message)]
    InvalidTerm { name: String, message: String },
    #[error("Unknown term type {}", .0)]
    UnknownTermType(String),
    #[error("Contact manager error: {}", .0)]
    ContactManager(String),
    #[error("Shape of {} does not support continuous collision checking", .0)]
    UnsupportedShape(String),
    #[error("IO error {:?}", source)]
    Io {
        #[from]
        source: io::Error,
    },
    #[error("URDF error: {:?}", source)]
    Urdf {
        #[from]
        source: urdf_rs::UrdfError,
    },
    #[error("Kinematics error: {:?}", source)]
    KinematicsError {
        #[from]
        source: k::Error,
    },
    #[error("Json error: {:?}", source)]
    Json {
        #[from]
        source: serde_json::Error,
    },
    #[error("failed to parse {}", .0)]
    ParseError(String),
    #[error("Mesh error {}", .0)]
    MeshError(String),
}

/// Result for `openrr_trajopt`
pub type Result<T> = ::std::result::Result<T, Error>;
