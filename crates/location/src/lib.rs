pub mod gazetteer;
pub mod geo;
pub mod resolver;

pub use gazetteer::{Gazetteer, GazetteerPlace, MatchStrength, Prefecture};
pub use geo::{haversine_km, Bounds};
pub use resolver::{
    LocationResolver, COMPANY_CONFIDENCE, GPS_CONFIDENCE, USER_EXACT_CONFIDENCE,
    USER_PARTIAL_CONFIDENCE,
};
