use super::*;

fn client(base: &str) -> ApifyClient {
    ApifyClient::new(base, "tok", 5, 0, 0).unwrap()
}

#[test]
fn run_url_replaces_actor_slash() {
    let url = client("https://api.apify.com").run_url("apify/instagram-profile-scraper");
    assert_eq!(
        url,
        "https://api.apify.com/v2/acts/apify~instagram-profile-scraper/run-sync-get-dataset-items"
    );
}

#[test]
fn run_url_strips_trailing_slash_from_base() {
    let url = client("http://localhost:9000/").run_url("apify/threads-scraper");
    assert_eq!(
        url,
        "http://localhost:9000/v2/acts/apify~threads-scraper/run-sync-get-dataset-items"
    );
}

#[test]
fn pick_token_from_empty_list_is_none() {
    assert!(pick_token(&[]).is_none());
}

#[test]
fn pick_token_returns_a_configured_token() {
    let tokens = vec!["a".to_string(), "b".to_string(), "c".to_string()];
    for _ in 0..20 {
        let picked = pick_token(&tokens).unwrap();
        assert!(tokens.contains(picked));
    }
}

#[test]
fn debug_redacts_token() {
    let rendered = format!("{:?}", ApifyClient::new("http://x", "secret-token", 5, 0, 0).unwrap());
    assert!(!rendered.contains("secret-token"));
    assert!(rendered.contains("[redacted]"));
}
