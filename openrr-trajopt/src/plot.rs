use tracing::info;

use crate::collision::ContactResult;

/// Receives the contacts of the terms to show them to the user
pub trait Visualization {
    /// `safety_distances[i]` is the margin of the pair of `contacts[i]`
    fn plot_contact_results(&mut self, contacts: &[ContactResult], safety_distances: &[f64]);
}

/// [`Visualization`] which writes the contacts to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogVisualization;

impl Visualization for LogVisualization {
    fn plot_contact_results(&mut self, contacts: &[ContactResult], safety_distances: &[f64]) {
        for (contact, safety_distance) in contacts.iter().zip(safety_distances) {
            let state = if contact.distance < 0.0 {
                "collision"
            } else if contact.distance < *safety_distance {
                "too close"
            } else {
                "ok"
            };
            info!(
                "{} - {}: distance={:.4} margin={:.4} ({state})",
                contact.link_names[0], contact.link_names[1], contact.distance, safety_distance
            );
        }
    }
}
