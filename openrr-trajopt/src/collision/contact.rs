use k::nalgebra as na;

/// Where along a swept motion the contact of a link happens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContinuousCollisionType {
    /// Discrete contact or a link which does not move
    #[default]
    None,
    /// At the start configuration
    Time0,
    /// At the end configuration
    Time1,
    /// Between the two configurations, see `cc_time`
    Between,
}

/// One pairwise contact between two collision objects
///
/// Index 0 and 1 of every array refer to `link_names[0]` and `link_names[1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactResult {
    pub link_names: [String; 2],
    /// Signed distance, negative when penetrating
    pub distance: f64,
    /// Closest points in the world frame
    pub nearest_points: [na::Point3<f64>; 2],
    /// Unit normal in the world frame pointing from object 0 to object 1
    pub normal: na::Vector3<f64>,
    /// Link poses in the world frame (start of the motion for casts)
    pub transform: [na::Isometry3<f64>; 2],
    /// Link poses in the world frame at the end of the motion
    pub cc_transform: [na::Isometry3<f64>; 2],
    pub cc_type: [ContinuousCollisionType; 2],
    /// Fraction in [0, 1] of the motion at which the contact happens
    pub cc_time: [f64; 2],
}

impl ContactResult {
    /// Create a discrete contact
    pub fn new(
        link_names: [String; 2],
        distance: f64,
        nearest_points: [na::Point3<f64>; 2],
        normal: na::Vector3<f64>,
        transform: [na::Isometry3<f64>; 2],
    ) -> Self {
        Self {
            link_names,
            distance,
            nearest_points,
            normal,
            transform,
            cc_transform: transform,
            cc_type: [ContinuousCollisionType::None; 2],
            cc_time: [0.0; 2],
        }
    }
}

pub type ContactResultVector = Vec<ContactResult>;
