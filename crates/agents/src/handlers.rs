//! Pivot-language answers for each route. Every handler absorbs collaborator
//! failures and always produces a reply.

use std::sync::Arc;

use tabi_core::{
    CollaboratorError, Degradation, FaqAnswer, IntentClassification, LangCode, LocationRecord,
    PlaceCategory, PlaceResult, PlacesSearch, ResponseType, RestaurantContext, Route,
    SpecializedLink, TurnContext, MEDIUM_FAQ_CONFIDENCE,
};
use tracing::{debug, warn};

use crate::links::{link_lines, LinkBuilder, LinkIntent};

const FOLLOW_UP: &str = "💡 **他にもお手伝いできることがあれば、お気軽にお声がけください！**";
const RESTAURANT_FOOTER: &str =
    "💡 地元の美味しいお店をお探しでしたら、フロントスタッフにもお気軽にお声がけください！";
const UNKNOWN_ANSWER: &str = "申し訳ございません。その件については、担当者が確認いたします。しばらくお待ちください。\n\n💡 別のご質問がございましたら、お気軽にお尋ねください。";

/// What the orchestrator knows about the turn by the time it dispatches.
#[derive(Debug, Clone, Copy)]
pub struct TurnFacts<'a> {
    pub text: &'a str,
    pub intent: &'a IntentClassification,
    pub faq: &'a FaqAnswer,
    pub location: Option<&'a LocationRecord>,
    pub language: LangCode,
}

#[derive(Debug, Clone)]
pub struct HandlerReply {
    pub answer: String,
    pub confidence: f32,
    pub response_type: ResponseType,
    pub links: Vec<SpecializedLink>,
    pub escalate: bool,
    pub location_enhanced: bool,
    pub degradations: Vec<Degradation>,
}

impl HandlerReply {
    fn new(answer: String, confidence: f32, response_type: ResponseType) -> Self {
        Self {
            answer,
            confidence,
            response_type,
            links: Vec::new(),
            escalate: false,
            location_enhanced: false,
            degradations: Vec::new(),
        }
    }
}

pub struct Handlers {
    places: Arc<dyn PlacesSearch>,
    links: LinkBuilder,
}

impl Handlers {
    pub fn new(places: Arc<dyn PlacesSearch>, links: LinkBuilder) -> Self {
        Self { places, links }
    }

    pub fn dispatch(&self, context: &TurnContext, route: Route, facts: &TurnFacts<'_>) -> HandlerReply {
        match route {
            Route::FaqEnriched => self.faq_enriched(facts),
            Route::Mixed => self.mixed(facts),
            Route::Restaurant(RestaurantContext::Internal) => internal_restaurant(facts),
            Route::Restaurant(_) => self.external_restaurant(context, facts),
            Route::Tourism => self.tourism(context, facts),
            Route::FaqMedium => faq_medium(facts),
            Route::Unknown => unknown(),
        }
    }

    fn faq_enriched(&self, facts: &TurnFacts<'_>) -> HandlerReply {
        let mut answer = facts.faq.answer.clone();
        let mut links = Vec::new();
        if let (true, Some(location)) = (facts.intent.tourism, facts.location) {
            links = self
                .links
                .links(LinkIntent::Tourism, location, facts.text, facts.language);
            if !links.is_empty() {
                answer.push_str(&format!(
                    "\n\n📍 **{}周辺の観光情報:**\n{}",
                    location.display_name(),
                    link_lines(&links, 2)
                ));
            }
        }

        let mut reply = HandlerReply::new(answer, facts.faq.confidence_hint, ResponseType::FaqEnhanced);
        reply.location_enhanced = !links.is_empty();
        reply.links = links;
        reply
    }

    fn external_restaurant(&self, context: &TurnContext, facts: &TurnFacts<'_>) -> HandlerReply {
        let Some(location) = facts.location else {
            return restaurant_general(facts);
        };
        let area = location.display_name();
        let links = self
            .links
            .links(LinkIntent::Restaurant, location, facts.text, LangCode::Ja);
        let mut degradations = Vec::new();

        let body = match self.search(context, area, facts.text, PlaceCategory::Restaurant) {
            Ok(places) if !places.is_empty() => {
                let mut body = format_places(&places, area, "レストラン");
                if !links.is_empty() {
                    body.push_str("\n\n📍 **その他のグルメ情報:**\n");
                    body.push_str(&link_lines(&links, 2));
                }
                body
            }
            result => {
                if let Err(err) = result {
                    warn!(area, error = %err, "restaurant search failed, using links");
                    if err.is_timeout() {
                        degradations.push(Degradation::ExternalServiceTimeout);
                    }
                }
                format!("🍽️ **{}のグルメ情報:**\n{}", area, link_lines(&links, 5))
            }
        };

        let mut reply = HandlerReply::new(
            format!("{body}\n\n{RESTAURANT_FOOTER}"),
            facts.intent.confidence,
            ResponseType::ExternalRestaurant,
        );
        reply.links = links;
        reply.location_enhanced = true;
        reply.degradations = degradations;
        reply
    }

    fn tourism(&self, context: &TurnContext, facts: &TurnFacts<'_>) -> HandlerReply {
        let Some(location) = facts.location else {
            return HandlerReply::new(
                "🌸 **観光情報について:**\n位置情報を設定していただくと、より詳しい観光情報をご案内できます。"
                    .to_string(),
                0.5,
                ResponseType::TourismNoLocation,
            );
        };
        let area = location.display_name();

        let places = match self.search(context, area, facts.text, PlaceCategory::Tourism) {
            Ok(places) => places,
            Err(err) => {
                warn!(area, error = %err, "tourism search failed");
                let mut reply = HandlerReply::new(
                    format!(
                        "🌸 **{area}の観光情報:**\n申し訳ございません。現在観光情報の取得に問題が発生しております。フロントスタッフにお尋ねください。"
                    ),
                    0.3,
                    ResponseType::TourismError,
                );
                reply.escalate = true;
                if err.is_timeout() {
                    reply.degradations.push(Degradation::ExternalServiceTimeout);
                }
                return reply;
            }
        };

        let links = self
            .links
            .links(LinkIntent::Tourism, location, facts.text, LangCode::Ja);
        let answer = if places.is_empty() {
            let details = if links.is_empty() {
                "📍 **詳細情報を取得できませんでした**".to_string()
            } else {
                format!("📍 **詳細情報:**\n{}", link_lines(&links, 5))
            };
            format!(
                "🌸 **{area}の観光情報:**\n{area}の観光・グルメ情報をお探しですね。以下のリンクから詳細情報をご確認いただけます。\n\n{details}"
            )
        } else {
            let mut body = format_places(&places, area, "観光スポット");
            if !links.is_empty() {
                body.push_str("\n\n📍 **その他の情報源:**\n");
                body.push_str(&link_lines(&links, 2));
            }
            body
        };

        let mut reply = HandlerReply::new(answer, 0.8, ResponseType::Tourism);
        reply.links = links;
        reply.location_enhanced = true;
        reply
    }

    fn mixed(&self, facts: &TurnFacts<'_>) -> HandlerReply {
        let mut answer = String::new();
        let mut links = Vec::new();

        if facts.faq.confidence_hint >= MEDIUM_FAQ_CONFIDENCE {
            answer.push_str(&format!("📋 **FAQ回答:**\n{}\n\n", facts.faq.answer));
        }

        if let Some(location) = facts.location {
            let area = location.display_name();
            if facts.intent.tourism {
                answer.push_str(&format!(
                    "🌸 **観光情報:**\n{area}の観光・グルメ情報をお探しですね。以下のリンクから詳細情報をご確認いただけます。\n\n"
                ));
                links.extend(
                    self.links
                        .links(LinkIntent::Tourism, location, facts.text, facts.language),
                );
            }
            if facts.intent.restaurant {
                let restaurant =
                    self.links
                        .links(LinkIntent::Restaurant, location, facts.text, facts.language);
                answer.push_str("🍽️ **グルメ情報:**\n");
                answer.push_str(&link_lines(&restaurant, 2));
                answer.push_str("\n\n");
                links.extend(restaurant);
            }
        }
        answer.push_str(FOLLOW_UP);

        let mut reply = HandlerReply::new(
            answer,
            facts.faq.confidence_hint.max(0.7),
            ResponseType::Mixed,
        );
        reply.location_enhanced = facts.location.is_some() && !links.is_empty();
        reply.links = links;
        reply
    }

    fn search(
        &self,
        context: &TurnContext,
        area: &str,
        query: &str,
        category: PlaceCategory,
    ) -> Result<Vec<PlaceResult>, CollaboratorError> {
        context.ensure_active("places")?;
        let places = self.places.search(area, query, category, LangCode::Ja)?;
        debug!(area, category = category.as_str(), results = places.len(), "places search");
        Ok(places)
    }
}

fn internal_restaurant(facts: &TurnFacts<'_>) -> HandlerReply {
    if facts.faq.confidence_hint >= MEDIUM_FAQ_CONFIDENCE {
        HandlerReply::new(
            format!("🏨 **旅館のお食事について:**\n{}", facts.faq.answer),
            facts.intent.confidence,
            ResponseType::InternalRestaurant,
        )
    } else {
        HandlerReply::new(
            "🏨 **旅館のお食事について:**\nお食事に関する詳細は、フロントまでお気軽にお尋ねください。"
                .to_string(),
            facts.intent.confidence,
            ResponseType::InternalRestaurantUnknown,
        )
    }
}

fn restaurant_general(facts: &TurnFacts<'_>) -> HandlerReply {
    let mut answer = String::from("🍽️ **お食事について:**\n");
    if facts.faq.confidence_hint >= MEDIUM_FAQ_CONFIDENCE {
        answer.push_str(&format!("• 館内でのお食事: {}\n\n", facts.faq.answer));
    }
    answer.push_str("• 周辺レストラン情報: 位置情報を設定していただくと、地域のグルメ情報をご案内できます。");
    HandlerReply::new(answer, facts.intent.confidence, ResponseType::RestaurantGeneral)
}

fn faq_medium(facts: &TurnFacts<'_>) -> HandlerReply {
    HandlerReply::new(
        format!("📋 **FAQ回答:**\n{}\n\n{FOLLOW_UP}", facts.faq.answer),
        facts.faq.confidence_hint,
        ResponseType::FaqMedium,
    )
}

fn unknown() -> HandlerReply {
    let mut reply = HandlerReply::new(UNKNOWN_ANSWER.to_string(), 0.0, ResponseType::Unknown);
    reply.escalate = true;
    reply
}

/// `⭐⭐⭐⭐ (4.3)`; empty for unrated places.
pub fn format_rating(rating: f32) -> String {
    if rating.is_nan() || rating <= 0.0 {
        return String::new();
    }
    let stars = (rating.floor() as usize).clamp(1, 5);
    format!("{} ({:.1})", "⭐".repeat(stars), rating)
}

/// Numbered place list. Detail lines start with the emoji the back-translation
/// step leaves untouched.
pub fn format_places(places: &[PlaceResult], area: &str, label: &str) -> String {
    let mut out = format!("📍 **{area}の{label}情報（Google）:**\n\n");
    for (idx, place) in places.iter().enumerate() {
        out.push_str(&format!("{}. **[{}]({})**\n", idx + 1, place.name, place.maps_url));
        let rating = format_rating(place.rating);
        if !rating.is_empty() {
            out.push_str(&format!("   {rating}\n"));
        }
        if !place.address.trim().is_empty() {
            out.push_str(&format!("   📍 {}\n", place.address.trim()));
        }
        match place.open_now {
            Some(true) => out.push_str("   🕒 営業中\n"),
            Some(false) => out.push_str("   🕒 営業時間外\n"),
            None => {}
        }
        out.push('\n');
    }
    out.push_str("💡 より詳しい情報は各リンクをクリックしてご確認ください。");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use tabi_core::{IntentClassifier, Lexicon, LocationKind};
    use tabi_location::Gazetteer;

    struct FakePlaces {
        result: Result<Vec<PlaceResult>, CollaboratorError>,
        calls: Mutex<Vec<(String, PlaceCategory)>>,
    }

    impl FakePlaces {
        fn new(result: Result<Vec<PlaceResult>, CollaboratorError>) -> Self {
            Self {
                result,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl PlacesSearch for FakePlaces {
        fn search(
            &self,
            location: &str,
            _query: &str,
            category: PlaceCategory,
            _language: LangCode,
        ) -> Result<Vec<PlaceResult>, CollaboratorError> {
            self.calls.lock().push((location.to_string(), category));
            self.result.clone()
        }
    }

    fn handlers(places: Arc<FakePlaces>) -> Handlers {
        Handlers::new(
            places,
            LinkBuilder::new(Arc::new(Gazetteer::bundled().unwrap())),
        )
    }

    fn classify(text: &str) -> IntentClassification {
        IntentClassifier::new(Lexicon::bundled().unwrap().intent).classify(text)
    }

    fn faq(answer: &str, confidence: f32) -> FaqAnswer {
        FaqAnswer {
            answer: answer.to_string(),
            confidence_hint: confidence,
        }
    }

    fn beppu() -> LocationRecord {
        LocationRecord {
            city: "別府市".to_string(),
            prefecture: "大分県".to_string(),
            region: "九州".to_string(),
            postal_code: None,
            address: None,
            kind: LocationKind::DemoDefault,
        }
    }

    fn place(name: &str, rating: f32, open_now: Option<bool>) -> PlaceResult {
        PlaceResult {
            name: name.to_string(),
            address: "大分県別府市北浜1-1".to_string(),
            rating,
            open_now,
            maps_url: "https://www.google.com/maps/place/?q=place_id:abc".to_string(),
        }
    }

    #[test]
    fn external_restaurant_lists_places_then_links() {
        let places = Arc::new(FakePlaces::new(Ok(vec![place("とり天 東洋軒", 4.3, Some(true))])));
        let text = "周辺でおすすめのレストランは？";
        let intent = classify(text);
        let faq = faq("", 0.0);
        let location = beppu();
        let facts = TurnFacts {
            text,
            intent: &intent,
            faq: &faq,
            location: Some(&location),
            language: LangCode::Ja,
        };

        let reply = handlers(places.clone()).dispatch(
            &TurnContext::new(),
            intent.route(faq.confidence_hint),
            &facts,
        );
        assert_eq!(reply.response_type, ResponseType::ExternalRestaurant);
        assert!(reply.answer.starts_with("📍 **別府市のレストラン情報（Google）:**"));
        assert!(reply.answer.contains("1. **[とり天 東洋軒]("));
        assert!(reply.answer.contains("📍 **その他のグルメ情報:**"));
        assert!(reply.answer.ends_with(RESTAURANT_FOOTER));
        assert!(reply.location_enhanced);
        assert_eq!(reply.confidence, intent.confidence);
        assert_eq!(
            places.calls.lock().as_slice(),
            &[("別府市".to_string(), PlaceCategory::Restaurant)]
        );
    }

    #[test]
    fn restaurant_search_failure_falls_back_to_links() {
        let places = Arc::new(FakePlaces::new(Err(CollaboratorError::Timeout {
            service: "places",
        })));
        let text = "近くのレストランを教えて";
        let intent = classify(text);
        let faq = faq("", 0.0);
        let location = beppu();
        let facts = TurnFacts {
            text,
            intent: &intent,
            faq: &faq,
            location: Some(&location),
            language: LangCode::Ja,
        };

        let reply = handlers(places).dispatch(&TurnContext::new(), Route::Restaurant(RestaurantContext::External), &facts);
        assert!(reply.answer.starts_with("🍽️ **別府市のグルメ情報:**\n• **["));
        assert!(!reply.escalate);
        assert_eq!(reply.degradations, vec![Degradation::ExternalServiceTimeout]);
    }

    #[test]
    fn internal_restaurant_uses_faq_or_front_desk() {
        let places = Arc::new(FakePlaces::new(Ok(Vec::new())));
        let handlers = handlers(places.clone());
        let text = "旅館の夕食の料理について";
        let intent = classify(text);
        let route = intent.route(0.6);
        assert_eq!(route, Route::Restaurant(RestaurantContext::Internal));

        let answered = faq("夕食は18時から個室でご用意します。", 0.6);
        let facts = TurnFacts {
            text,
            intent: &intent,
            faq: &answered,
            location: None,
            language: LangCode::Ja,
        };
        let reply = handlers.dispatch(&TurnContext::new(), route, &facts);
        assert_eq!(reply.response_type, ResponseType::InternalRestaurant);
        assert!(reply.answer.contains("夕食は18時から"));

        let missing = faq("", 0.1);
        let facts = TurnFacts {
            faq: &missing,
            ..facts
        };
        let reply = handlers.dispatch(&TurnContext::new(), route, &facts);
        assert_eq!(reply.response_type, ResponseType::InternalRestaurantUnknown);
        assert!(places.calls.lock().is_empty());
    }

    #[test]
    fn restaurant_without_location_is_general() {
        let places = Arc::new(FakePlaces::new(Ok(Vec::new())));
        let text = "おすすめのレストランは？";
        let intent = classify(text);
        let faq = faq("館内にお食事処がございます。", 0.55);
        let facts = TurnFacts {
            text,
            intent: &intent,
            faq: &faq,
            location: None,
            language: LangCode::En,
        };
        let reply = handlers(places).dispatch(&TurnContext::new(), Route::Restaurant(RestaurantContext::External), &facts);
        assert_eq!(reply.response_type, ResponseType::RestaurantGeneral);
        assert!(reply.answer.contains("• 館内でのお食事: 館内にお食事処がございます。"));
        assert!(reply.links.is_empty());
    }

    #[test]
    fn tourism_without_results_uses_link_fallback() {
        let places = Arc::new(FakePlaces::new(Ok(Vec::new())));
        let text = "観光スポットを教えて";
        let intent = classify(text);
        let faq = faq("", 0.0);
        let location = beppu();
        let facts = TurnFacts {
            text,
            intent: &intent,
            faq: &faq,
            location: Some(&location),
            language: LangCode::En,
        };
        let reply = handlers(places).dispatch(&TurnContext::new(), Route::Tourism, &facts);
        assert_eq!(reply.response_type, ResponseType::Tourism);
        assert_eq!(reply.confidence, 0.8);
        assert!(reply.answer.contains("📍 **詳細情報:**"));
        // handlers link in Japanese regardless of the guest language
        assert!(reply.links.iter().any(|link| link.name.contains("じゃらん")));
    }

    #[test]
    fn tourism_error_escalates() {
        let places = Arc::new(FakePlaces::new(Err(CollaboratorError::unavailable(
            "places",
            "HTTP 500",
        ))));
        let text = "観光スポットを教えて";
        let intent = classify(text);
        let faq = faq("", 0.0);
        let location = beppu();
        let facts = TurnFacts {
            text,
            intent: &intent,
            faq: &faq,
            location: Some(&location),
            language: LangCode::Ja,
        };
        let reply = handlers(places).dispatch(&TurnContext::new(), Route::Tourism, &facts);
        assert_eq!(reply.response_type, ResponseType::TourismError);
        assert!(reply.escalate);
        assert_eq!(reply.confidence, 0.3);
        assert!(reply.links.is_empty());
    }

    #[test]
    fn cancelled_turn_does_not_search() {
        let places = Arc::new(FakePlaces::new(Ok(vec![place("海地獄", 4.5, None)])));
        let text = "観光スポットを教えて";
        let intent = classify(text);
        let faq = faq("", 0.0);
        let location = beppu();
        let facts = TurnFacts {
            text,
            intent: &intent,
            faq: &faq,
            location: Some(&location),
            language: LangCode::Ja,
        };
        let context = TurnContext::new();
        context.cancel();
        let reply = handlers(places.clone()).dispatch(&context, Route::Tourism, &facts);
        assert_eq!(reply.response_type, ResponseType::TourismError);
        assert!(places.calls.lock().is_empty());
    }

    #[test]
    fn high_confidence_faq_adds_tourism_links() {
        let places = Arc::new(FakePlaces::new(Ok(Vec::new())));
        let text = "観光の前に荷物を預けられますか";
        let intent = classify(text);
        let faq = faq("フロントでお預かりします。", 0.9);
        let location = beppu();
        let facts = TurnFacts {
            text,
            intent: &intent,
            faq: &faq,
            location: Some(&location),
            language: LangCode::Ja,
        };
        let reply = handlers(places).dispatch(&TurnContext::new(), Route::FaqEnriched, &facts);
        assert_eq!(reply.response_type, ResponseType::FaqEnhanced);
        assert!(reply.answer.starts_with("フロントでお預かりします。\n\n📍 **別府市周辺の観光情報:**"));
        assert!(reply.location_enhanced);
        assert_eq!(reply.confidence, 0.9);
    }

    #[test]
    fn mixed_reply_has_floor_confidence() {
        let places = Arc::new(FakePlaces::new(Ok(Vec::new())));
        let text = "観光とランチのおすすめ";
        let intent = classify(text);
        let faq = faq("", 0.2);
        let location = beppu();
        let facts = TurnFacts {
            text,
            intent: &intent,
            faq: &faq,
            location: Some(&location),
            language: LangCode::Ja,
        };
        let reply = handlers(places).dispatch(&TurnContext::new(), Route::Mixed, &facts);
        assert_eq!(reply.response_type, ResponseType::Mixed);
        assert_eq!(reply.confidence, 0.7);
        assert!(reply.answer.contains("🌸 **観光情報:**"));
        assert!(reply.answer.contains("🍽️ **グルメ情報:**"));
        assert!(reply.answer.ends_with(FOLLOW_UP));
        assert_eq!(reply.links.len(), 4);
    }

    #[test]
    fn unknown_escalates_with_zero_confidence() {
        let reply = unknown();
        assert!(reply.escalate);
        assert_eq!(reply.confidence, 0.0);
        assert_eq!(reply.response_type, ResponseType::Unknown);
    }

    #[test]
    fn place_list_formatting() {
        let out = format_places(
            &[place("海地獄", 4.6, Some(false)), place("無評価", 0.0, None)],
            "別府市",
            "観光スポット",
        );
        assert!(out.contains("1. **[海地獄](https://www.google.com/maps/place/?q=place_id:abc)**\n   ⭐⭐⭐⭐ (4.6)\n   📍 大分県別府市北浜1-1\n   🕒 営業時間外\n"));
        assert!(out.contains("2. **[無評価]("));
        assert_eq!(format_rating(0.0), "");
        assert_eq!(format_rating(5.0), "⭐⭐⭐⭐⭐ (5.0)");
    }
}
