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
//! # Collision Terms for Trajectory Optimization
//!
//! Costs and constraints which keep a robot away from obstacles, for a
//! sequential convex optimizer working on the whole trajectory at once.
//! `ncollide3d` is used to compute the contacts between the links and the
//! environment, `k` for the kinematics.
//!
//! Contacts are computed once per configuration and shared between the cost
//! and the constraint of the same term.

#![warn(rust_2018_idioms)]

mod errors;

pub mod cache;

pub mod collision;

mod collision_terms;

mod funcs;

mod kinematics;

mod plot;

mod problem;

mod safety_margin;

pub mod sco;

mod term_info;

pub use crate::{
    collision::{CollisionDetector, Environment, FromUrdf},
    collision_terms::*,
    errors::{Error, Result},
    funcs::*,
    kinematics::*,
    plot::*,
    problem::*,
    safety_margin::*,
    term_info::*,
};
