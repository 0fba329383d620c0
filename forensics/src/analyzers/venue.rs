//! Venue sensitivity matrix.

use serde::{Deserialize, Serialize};

use crate::artifact::{VenueDoc, VenueTheme, VolatilityZone};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueSensitivity {
    pub venue: String,
    /// Themes by descending salience, then name
    pub themes: Vec<VenueTheme>,
    pub volatility_zones: Vec<VolatilityZone>,
}

pub fn venue_sensitivity_matrix(doc: &VenueDoc) -> VenueSensitivity {
    let mut themes = doc.themes.clone();
    themes.sort_by(|a, b| b.salience.cmp(&a.salience).then_with(|| a.theme.cmp(&b.theme)));
    VenueSensitivity {
        venue: doc.venue.clone(),
        themes,
        volatility_zones: doc.volatility_zones.clone(),
    }
}
