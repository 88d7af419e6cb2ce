//! Library API integration tests
use grantscope_core::*;
use rstest::rstest;

fn get_fixture_path(name: &str) -> String {
    format!("../../tests/fixtures/{}", name)
}

fn read_fixture(name: &str) -> String {
    std::fs::read_to_string(get_fixture_path(name)).unwrap()
}

fn offline() -> Extractor<HttpTransport> {
    let config = ExtractorConfig::builder().cache_enabled(false).build();
    Extractor::with_config(config).with_resolver(ProfileResolver::new())
}

#[rstest]
#[case("broken_table.html", ContentType::Grants, "structural", 1)]
#[case("labelled_notice.html", ContentType::Grants, "regex_fallback", 1)]
#[case("funding_cards.html", ContentType::Funding, "structural", 2)]
#[case("text_listing.html", ContentType::Grants, "text_extraction", 2)]
#[case("heuristic_chunk.html", ContentType::Grants, "heuristic_relevance", 1)]
fn test_fixture_winners(
    #[case] fixture: &str, #[case] content_type: ContentType, #[case] winner: &str, #[case] count: usize,
) {
    let result = offline().parse_html(&read_fixture(fixture), None, content_type);

    assert!(result.success, "{fixture}");
    assert_eq!(result.winning_strategy(), Some(winner), "{fixture}");
    assert_eq!(result.records.len(), count, "{fixture}");
    assert_eq!(result.strategies_attempted.last().map(|a| a.name.as_str()), Some(winner));
    assert!(result.records.iter().all(|r| !r.is_empty()));
}

#[test]
fn test_unclosed_table_scenario() {
    let result = extract_html(&read_fixture("broken_table.html"), ContentType::Grants);

    assert!(result.issues.iter().any(|i| i.issue_type == IssueType::BrokenTables));
    assert_eq!(result.strategies_attempted.len(), 1);
    assert_eq!(
        result.strategies_attempted[0],
        StrategyAttempt { name: "structural".to_string(), success: true, records_found: 1, error: None }
    );

    let expected: Record =
        [("title", "Ocean Grant"), ("agency", "EPA"), ("deadline", "12/31/2025"), ("amount", "$50,000")]
            .into_iter()
            .collect();
    assert_eq!(result.records, vec![expected]);
}

#[test]
fn test_heuristic_wins_after_three_failures() {
    let html = read_fixture("heuristic_chunk.html");
    let result = extract_html(&html, ContentType::Grants);

    let names: Vec<&str> = result.strategies_attempted.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, ["structural", "regex_fallback", "text_extraction", "heuristic_relevance"]);
    assert!(result.strategies_attempted[..3].iter().all(|a| !a.success && a.records_found == 0));

    let expected: Record = [("amount", "$5")].into_iter().collect();
    assert_eq!(result.records, vec![expected]);

    let profile = SiteProfile::default();
    let ctx = ExtractionContext::new(ContentType::Grants, &profile);
    let sanitized = Sanitizer::new().sanitize(&html);
    assert_eq!(Strategy::HeuristicRelevance.attempt(&sanitized.html, &ctx).unwrap(), result.records);
}

#[test]
fn test_labelled_notice_fields() {
    let result = extract_html(&read_fixture("labelled_notice.html"), ContentType::Grants);
    let record = &result.records[0];

    assert_eq!(record.get("title"), Some("Coastal Resilience Planning"));
    assert_eq!(record.get("deadline"), Some("09/30/2026"));
    assert_eq!(record.get("amount"), Some("$250,000"));
    assert_eq!(record.get("agency"), Some("National Oceanic and Atmospheric Administration"));
}

#[test]
fn test_funding_cards_use_sponsor() {
    let result = extract_html(&read_fixture("funding_cards.html"), ContentType::Funding);

    assert_eq!(result.records[0].get("title"), Some("Arts Education Initiative"));
    assert_eq!(result.records[0].get("sponsor"), Some("National Endowment for the Arts"));
    assert_eq!(result.records[1].get("amount"), Some("$75,000"));
    assert!(result.records.iter().all(|r| !r.contains("agency")));
}

#[test]
fn test_embedded_json_needs_site_profile() {
    let html = read_fixture("sam_contracts.html");

    let without = offline().parse_html(&html, None, ContentType::Contracts);
    assert!(!without.success);
    assert_eq!(without.strategies_attempted.len(), 5);

    let with = offline().parse_html(&html, Some("https://sam.gov/search?index=opp"), ContentType::Contracts);
    assert!(with.success);
    assert_eq!(with.winning_strategy(), Some("site_specific"));
    assert_eq!(with.records.len(), 2);
    assert_eq!(with.records[0].get("title"), Some("Base Operations Support"));
    assert_eq!(with.records[0].get("agency"), Some("Department of the Navy"));
    assert_eq!(with.records[0].get("deadline"), Some("2026-03-15"));
    assert_eq!(with.records[0].get("value"), Some("1200000"));
    assert_eq!(with.records[1].get("value"), None);
}

#[test]
fn test_nothing_found() {
    let result = offline().parse_html(&read_fixture("empty_page.html"), None, ContentType::Grants);

    assert!(!result.success);
    assert!(result.records.is_empty());
    assert!(result.error.is_none());
    let names: Vec<_> = result.strategies_attempted.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(
        names,
        ["structural", "regex_fallback", "text_extraction", "heuristic_relevance", "site_specific"]
    );
}

#[test]
fn test_sanitizer_never_fails_on_garbage() {
    let sanitizer = Sanitizer::new();
    let inputs: Vec<Vec<u8>> = vec![
        Vec::new(),
        vec![0xff, 0xfe, 0x00, 0x3c, 0x80],
        "<div>".repeat(500).into_bytes(),
        b"<table><tr><td><form><form></td>\x01\x02</p></span>".to_vec(),
    ];

    for input in inputs {
        let document = sanitizer.sanitize_bytes(&input);
        assert!(sanitizer.sanitize(&document.html).issues_found.is_empty());
    }
}

#[test]
fn test_stats_track_offline_parses() {
    let extractor = offline();
    extractor.parse_html(&read_fixture("text_listing.html"), None, ContentType::Grants);
    extractor.parse_html(&read_fixture("empty_page.html"), None, ContentType::Grants);

    let stats = extractor.stats();
    assert_eq!(stats.requests, 2);
    assert_eq!(stats.successful_parses, 1);
    assert_eq!(stats.failed_parses, 1);
    assert_eq!(stats.fallback_parses, 1);
    assert_eq!(stats.strategy_wins["text_extraction"], 1);
}

#[test]
fn test_result_round_trips_through_json() {
    let result = extract_html(&read_fixture("funding_cards.html"), ContentType::Funding);
    let json = to_json(&result, &JsonConfig::default()).unwrap();
    let back: ParseResult = serde_json::from_str(&json).unwrap();

    assert_eq!(back.records, result.records);
    assert_eq!(back.content_type, ContentType::Funding);
}

#[tokio::test]
async fn test_invalid_url_is_a_result_not_an_error() {
    let result = offline().parse("definitely not a url", ContentType::Grants).await;

    assert!(!result.success);
    assert!(result.error.unwrap().contains("Invalid URL"));
}
