use std::sync::Arc;

use tabi_core::{
    CompanyRecordStore, GeoPoint, LocationCandidate, LocationKind, LocationRecord,
    LocationSource, TurnContext,
};
use tracing::{debug, warn};

use crate::gazetteer::{Gazetteer, MatchStrength};
use crate::geo::haversine_km;

pub const USER_EXACT_CONFIDENCE: f32 = 0.98;
pub const USER_PARTIAL_CONFIDENCE: f32 = 0.95;
pub const COMPANY_CONFIDENCE: f32 = 0.8;
pub const GPS_CONFIDENCE: f32 = 0.6;

pub struct LocationResolver {
    gazetteer: Arc<Gazetteer>,
    companies: Arc<dyn CompanyRecordStore>,
}

impl LocationResolver {
    pub fn new(gazetteer: Arc<Gazetteer>, companies: Arc<dyn CompanyRecordStore>) -> Self {
        Self {
            gazetteer,
            companies,
        }
    }

    pub fn gazetteer(&self) -> &Gazetteer {
        &self.gazetteer
    }

    pub fn shared_gazetteer(&self) -> Arc<Gazetteer> {
        Arc::clone(&self.gazetteer)
    }

    pub fn resolve(
        &self,
        user_input: Option<&str>,
        gps: Option<GeoPoint>,
        company_id: &str,
    ) -> Option<LocationCandidate> {
        self.resolve_with(&TurnContext::new(), user_input, gps, company_id)
    }

    /// Collects up to three candidates and keeps the most confident one.
    pub fn resolve_with(
        &self,
        context: &TurnContext,
        user_input: Option<&str>,
        gps: Option<GeoPoint>,
        company_id: &str,
    ) -> Option<LocationCandidate> {
        let mut candidates = Vec::with_capacity(3);

        if let Some(input) = user_input {
            match self.gazetteer.match_input(input) {
                Some((location, strength)) => candidates.push(LocationCandidate {
                    source: LocationSource::UserInput,
                    location,
                    confidence: match strength {
                        MatchStrength::Exact => USER_EXACT_CONFIDENCE,
                        MatchStrength::Partial => USER_PARTIAL_CONFIDENCE,
                    },
                }),
                None => debug!(input, "manual location not recognised"),
            }
        }

        let company_base = self.company_base(context, company_id);
        if let Some(location) = company_base.clone() {
            candidates.push(LocationCandidate {
                source: LocationSource::CompanyBase,
                location,
                confidence: COMPANY_CONFIDENCE,
            });
        }

        if let Some(point) = gps {
            if self.gps_reasonable(point, company_base.as_ref()) {
                if let Some(location) = self.gps_location(point) {
                    candidates.push(LocationCandidate {
                        source: LocationSource::Gps,
                        location,
                        confidence: GPS_CONFIDENCE,
                    });
                }
            } else {
                debug!(lat = point.lat, lng = point.lng, "gps coordinates rejected");
            }
        }

        candidates
            .into_iter()
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
    }

    /// Stored record first, then the company-id hint, then the regional default.
    pub fn company_base(&self, context: &TurnContext, company_id: &str) -> Option<LocationRecord> {
        let company_id = company_id.trim();
        if company_id.is_empty() {
            return None;
        }

        if context.ensure_active("company_store").is_ok() {
            match self.companies.base_location(company_id) {
                Ok(Some(mut record))
                    if !record.prefecture.trim().is_empty() || !record.city.trim().is_empty() =>
                {
                    if record.region.trim().is_empty() {
                        record.region = self.gazetteer.region_of(&record.prefecture);
                    }
                    record.kind = LocationKind::Database;
                    return Some(record);
                }
                Ok(_) => debug!(company_id, "no stored base location, using fallback chain"),
                Err(err) => warn!(company_id, error = %err, "company store lookup failed"),
            }
        }

        Some(
            self.gazetteer
                .company_hint(company_id)
                .unwrap_or_else(|| self.gazetteer.regional_default()),
        )
    }

    /// Inside Japan, and near the company's prefecture when that is known.
    pub fn gps_reasonable(&self, point: GeoPoint, company_base: Option<&LocationRecord>) -> bool {
        if !self.gazetteer.japan_bounds.contains(point) {
            return false;
        }
        let expected = company_base.and_then(|base| self.gazetteer.prefecture(&base.prefecture));
        match expected {
            Some(pref) => haversine_km(point, pref.center) < self.gazetteer.gps_radius_km,
            None => true,
        }
    }

    fn gps_location(&self, point: GeoPoint) -> Option<LocationRecord> {
        self.gazetteer.prefecture_at(point).map(|pref| LocationRecord {
            city: String::new(),
            prefecture: pref.name.clone(),
            region: pref.region.clone(),
            postal_code: None,
            address: None,
            kind: LocationKind::GpsEstimate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tabi_core::CollaboratorError;

    #[derive(Default)]
    struct FakeCompanies {
        records: HashMap<String, LocationRecord>,
        failing: bool,
    }

    impl CompanyRecordStore for FakeCompanies {
        fn base_location(&self, company_id: &str) -> Result<Option<LocationRecord>, CollaboratorError> {
            if self.failing {
                return Err(CollaboratorError::Timeout {
                    service: "company_store",
                });
            }
            Ok(self.records.get(company_id).cloned())
        }
    }

    fn resolver(companies: FakeCompanies) -> LocationResolver {
        LocationResolver::new(Arc::new(Gazetteer::bundled().unwrap()), Arc::new(companies))
    }

    fn stored(prefecture: &str, city: &str) -> LocationRecord {
        LocationRecord {
            city: city.to_string(),
            prefecture: prefecture.to_string(),
            region: String::new(),
            postal_code: Some("870-0000".to_string()),
            address: Some("府内町1-1".to_string()),
            kind: LocationKind::Database,
        }
    }

    #[test]
    fn manual_input_beats_company_base() {
        let resolver = resolver(FakeCompanies::default());
        let candidate = resolver.resolve(Some("Kyoto"), None, "demo-company").unwrap();
        assert_eq!(candidate.source, LocationSource::UserInput);
        assert_eq!(candidate.confidence, USER_EXACT_CONFIDENCE);
        assert_eq!(candidate.location.city, "京都市");
    }

    #[test]
    fn stored_company_record_gets_region_filled_in() {
        let mut companies = FakeCompanies::default();
        companies
            .records
            .insert("hotel-1".to_string(), stored("熊本県", "阿蘇市"));
        let candidate = resolver(companies).resolve(None, None, "hotel-1").unwrap();
        assert_eq!(candidate.source, LocationSource::CompanyBase);
        assert_eq!(candidate.confidence, COMPANY_CONFIDENCE);
        assert_eq!(candidate.location.region, "九州");
        assert_eq!(candidate.location.kind, LocationKind::Database);
    }

    #[test]
    fn record_without_place_falls_back_to_hints() {
        let mut companies = FakeCompanies::default();
        companies
            .records
            .insert("osaka-inn".to_string(), stored("", ""));
        let candidate = resolver(companies).resolve(None, None, "osaka-inn").unwrap();
        assert_eq!(candidate.location.city, "大阪市");
        assert_eq!(candidate.location.kind, LocationKind::IdHint);
    }

    #[test]
    fn store_failure_uses_regional_default() {
        let companies = FakeCompanies {
            failing: true,
            ..FakeCompanies::default()
        };
        let candidate = resolver(companies).resolve(None, None, "acme").unwrap();
        assert_eq!(candidate.location.city, "大分市");
        assert_eq!(candidate.location.kind, LocationKind::RegionalDefault);
    }

    #[test]
    fn gps_only_candidate_when_no_company() {
        let resolver = resolver(FakeCompanies::default());
        let candidate = resolver
            .resolve(None, Some(GeoPoint::new(33.2846, 131.4914)), "")
            .unwrap();
        assert_eq!(candidate.source, LocationSource::Gps);
        assert_eq!(candidate.confidence, GPS_CONFIDENCE);
        assert_eq!(candidate.location.prefecture, "大分県");
    }

    #[test]
    fn gps_far_from_company_is_rejected() {
        let resolver = resolver(FakeCompanies::default());
        let base = resolver.company_base(&TurnContext::new(), "demo-company");
        let sapporo = GeoPoint::new(43.0642, 141.3469);
        let beppu = GeoPoint::new(33.2846, 131.4914);
        assert!(!resolver.gps_reasonable(sapporo, base.as_ref()));
        assert!(resolver.gps_reasonable(beppu, base.as_ref()));
        assert!(!resolver.gps_reasonable(GeoPoint::new(48.85, 2.35), None));
    }

    #[test]
    fn nothing_to_go_on_returns_none() {
        let resolver = resolver(FakeCompanies::default());
        assert!(resolver.resolve(Some("Atlantis"), None, "  ").is_none());
    }

    #[test]
    fn cancelled_turn_skips_store_lookup() {
        let mut companies = FakeCompanies::default();
        companies
            .records
            .insert("demo-company".to_string(), stored("東京都", "新宿区"));
        let resolver = resolver(companies);
        let context = TurnContext::new();
        context.cancel();
        let base = resolver.company_base(&context, "demo-company").unwrap();
        assert_eq!(base.kind, LocationKind::DemoDefault);
    }
}
