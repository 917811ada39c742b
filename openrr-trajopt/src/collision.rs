mod adjacency_map;
mod cast_hull;
mod collision_detector;
mod contact;
mod contact_manager;
mod mesh;
mod urdf;

pub use self::{
    adjacency_map::*, cast_hull::*, collision_detector::*, contact::*, contact_manager::*,
};
