//! End-to-end routing: dialplan matching, bridge targets and the
//! external-number lookup with its gateway fallback.

use callflow_call_engine::prelude::*;
use callflow_call_engine::routing::{match_destination, MatchOutcome, RoutingRule};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const EXTENSIONS: &str = r#"
    [general]
    domain = "pbx.local"

    [[dialplan.contexts.default]]
    name = "extensions"
    pattern = '^\d{4}$'
    actions = [{ type = "bridge", target = "user/{d}@{domain}" }]

    [[dialplan.contexts.default]]
    name = "ivr"
    pattern = '^123456$'
    actions = [{ type = "answer" }, { type = "playback", file = "ivr/welcome.wav" }]
"#;

fn lookup_dialplan(base_url: &str, timeout_ms: u64) -> String {
    format!(
        r#"
        [general]
        domain = "pbx.local"

        [[dialplan.contexts.default]]
        name = "extensions"
        pattern = '^\d{{4}}$'
        actions = [{{ type = "bridge", target = "user/{{d}}@{{domain}}" }}]

        [[dialplan.contexts.default]]
        name = "did-lookup"
        pattern = '^\+[1-9]\d{{6,14}}$'

        [[dialplan.contexts.default.actions]]
        type = "external_call"
        url = "{base_url}/lookup"
        params = {{ number = "{{d}}" }}
        timeout_ms = {timeout_ms}
        result_variable = "did_target"
        on_failure = [{{ type = "bridge", target = "sofia/gateway/default/{{d}}" }}]

        [[dialplan.contexts.default.actions]]
        type = "bridge"
        target = "${{did_target}}"
    "#
    )
}

fn engine(config: &str) -> Arc<CallFlowEngine> {
    let config = CallFlowConfig::from_toml_str(config).expect("valid dialplan");
    Arc::new(CallFlowEngine::builder().with_config(config).build().expect("engine builds"))
}

#[tokio::test]
async fn four_digit_destination_bridges_to_user() {
    let engine = engine(EXTENSIONS);
    let channel = Arc::new(SimulatedChannel::new().answering("user/1234@pbx.local"));

    let report = engine
        .spawn_call(InboundCall::new("2000", "1234", "pbx.local"), channel.clone())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(report.routes(), vec!["extensions"]);
    assert_eq!(report.matched[0].index, Some(0));
    assert_eq!(channel.bridges(), vec![vec!["user/1234@pbx.local".to_string()]]);
    assert_eq!(report.variables.get("bridged_to").map(String::as_str), Some("user/1234@pbx.local"));
    assert!(engine.registry().is_empty());
}

#[tokio::test]
async fn six_digit_destination_takes_the_ivr_rule() {
    let engine = engine(EXTENSIONS);
    let channel = Arc::new(SimulatedChannel::new());

    let report = engine
        .handle_call(InboundCall::new("2000", "123456", "pbx.local"), channel.clone())
        .await
        .unwrap();

    assert_eq!(report.routes(), vec!["ivr"]);
    assert!(channel.answered());
    assert_eq!(channel.plays(), vec!["ivr/welcome.wav".to_string()]);
    assert!(channel.bridges().is_empty());
    assert_eq!(report.hangup_cause, Some(HangupCause::NormalClearing));
}

#[tokio::test]
async fn unanswered_bridge_falls_through_to_next_action() {
    let engine = engine(
        r#"
        [general]
        domain = "pbx.local"

        [[dialplan.contexts.default]]
        name = "hunt"
        pattern = '^2\d{3}$'
        actions = [
            { type = "bridge", target = "user/{d}@{domain},user/{d}-mobile@{domain}", timeout_secs = 1 },
            { type = "playback", file = "ivr/unavailable.wav" },
            { type = "voicemail", mailbox = "{d}" },
        ]
    "#,
    );
    let channel = Arc::new(SimulatedChannel::new());

    let report = engine
        .handle_call(InboundCall::new("1000", "2001", "pbx.local"), channel.clone())
        .await
        .unwrap();

    assert_eq!(
        channel.bridges(),
        vec![vec!["user/2001@pbx.local".to_string(), "user/2001-mobile@pbx.local".to_string()]]
    );
    assert_eq!(report.variables.get("bridge_result").map(String::as_str), Some("failed"));
    assert_eq!(channel.played_count("ivr/unavailable.wav"), 1);
    assert_eq!(
        channel.executes(),
        vec![("voicemail".to_string(), "default pbx.local 2001".to_string())]
    );
}

#[tokio::test]
async fn lookup_without_data_falls_back_to_gateway() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/lookup"))
        .and(query_param("number", "+46851758284"))
        .respond_with(ResponseTemplate::new(200).set_body_string("no data"))
        .expect(1)
        .mount(&server)
        .await;

    let engine = engine(&lookup_dialplan(&server.uri(), 2000));
    let channel = Arc::new(SimulatedChannel::new().answering("sofia/gateway/default/+46851758284"));

    let report = engine
        .handle_call(InboundCall::new("1000", "+46851758284", "pbx.local"), channel.clone())
        .await
        .unwrap();

    assert_eq!(report.routes(), vec!["did-lookup"]);
    assert_eq!(report.variables.get("external_result").map(String::as_str), Some("no_data"));
    assert_eq!(
        channel.bridges(),
        vec![vec!["sofia/gateway/default/+46851758284".to_string()]]
    );
    assert_eq!(report.variables.get("bridge_result").map(String::as_str), Some("answered"));
}

#[tokio::test]
async fn lookup_result_becomes_bridge_target() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/lookup"))
        .respond_with(ResponseTemplate::new(200).set_body_string("user/7001@pbx.local\n"))
        .mount(&server)
        .await;

    let engine = engine(&lookup_dialplan(&server.uri(), 2000));
    let channel = Arc::new(SimulatedChannel::new().answering("user/7001@pbx.local"));

    let report = engine
        .handle_call(InboundCall::new("1000", "+46851758284", "pbx.local"), channel.clone())
        .await
        .unwrap();

    assert_eq!(report.variables.get("did_target").map(String::as_str), Some("user/7001@pbx.local"));
    assert_eq!(channel.bridges(), vec![vec!["user/7001@pbx.local".to_string()]]);
}

#[tokio::test]
async fn slow_lookup_times_out_to_gateway() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/lookup"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("user/7001@pbx.local")
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let engine = engine(&lookup_dialplan(&server.uri(), 100));
    let channel = Arc::new(SimulatedChannel::new().answering("sofia/gateway/default/+46851758284"));

    let report = engine
        .handle_call(InboundCall::new("1000", "+46851758284", "pbx.local"), channel.clone())
        .await
        .unwrap();

    assert_eq!(report.variables.get("external_result").map(String::as_str), Some("failed"));
    assert_eq!(
        channel.bridges(),
        vec![vec!["sofia/gateway/default/+46851758284".to_string()]]
    );
}

#[tokio::test]
async fn unmatched_e164_number_uses_external_trunk() {
    let engine = engine(EXTENSIONS);
    let channel = Arc::new(SimulatedChannel::new().answering("sofia/gateway/default/+46851758284"));

    let report = engine
        .handle_call(InboundCall::new("1000", "+46851758284", "pbx.local"), channel.clone())
        .await
        .unwrap();

    assert_eq!(report.routes(), vec!["external-trunk"]);
    assert_eq!(report.matched[0].index, None);
    assert_eq!(
        channel.bridges(),
        vec![vec!["sofia/gateway/default/+46851758284".to_string()]]
    );
}

#[test]
fn first_matching_rule_wins_regardless_of_later_rules() {
    let patterns = [r"^\d{4}$", r"^1\d+$", r"^123456$", r"\d+", r"^\+\d+$", r"^[0-9*#]+$"];
    let rules: Vec<RoutingRule> = patterns
        .iter()
        .enumerate()
        .map(|(i, p)| RoutingRule::new(format!("rule-{}", i), p, vec![]).unwrap())
        .collect();

    for destination in ["1234", "123456", "19", "5", "+4685", "*98#", "", "abc", "1234567890"] {
        let expected = rules.iter().position(|r| r.pattern.is_match(destination));
        match match_destination(destination, &rules) {
            MatchOutcome::Matched(m) => {
                assert_eq!(Some(m.index), expected, "destination {:?}", destination);
                assert_eq!(m.rule.name, format!("rule-{}", m.index));
            }
            MatchOutcome::NoMatch => assert_eq!(expected, None, "destination {:?}", destination),
        }
    }
}

#[test]
fn patterns_are_anchored_to_the_whole_destination() {
    let rules = vec![RoutingRule::new("four", r"\d{4}", vec![]).unwrap()];

    assert!(matches!(match_destination("1234", &rules), MatchOutcome::Matched(_)));
    assert!(matches!(match_destination("12345", &rules), MatchOutcome::NoMatch));
    assert!(matches!(match_destination("x1234", &rules), MatchOutcome::NoMatch));
}
