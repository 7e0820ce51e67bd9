use sqlform::catalog::{ManifestCatalog, ManifestFile};
use sqlform::orchestration::{
    ConversationContext, IntentAnalysis, IntentOracle, LexicalOracle, Operation, Route,
};
use sqlform::shared::ConversationId;

const MANIFEST: &str = r#"
tables:
  schedule:
    aliases: [schedules, calendar entry]
    columns:
      - { name: id, type: integer, identity: true, has_default: true }
      - { name: name, type: text }
  customer:
    aliases: [customers, client]
    columns:
      - { name: id, type: integer, identity: true, has_default: true }
      - { name: name, type: text }
      - { name: city, type: text, nullable: true }
  vendor:
    aliases: [client]
    columns:
      - { name: id, type: integer, identity: true, has_default: true }
"#;

fn analyze(text: &str) -> IntentAnalysis {
    let file: ManifestFile = serde_yaml::from_str(MANIFEST).expect("parse manifest");
    let catalog = ManifestCatalog::from_manifest_file(file).expect("catalog");
    let conversation = ConversationId::parse("c-1").expect("conversation id");
    let context = ConversationContext {
        conversation_id: &conversation,
        catalog: &catalog,
        history: None,
        active_session: None,
    };
    LexicalOracle::new()
        .analyze(text, &context)
        .expect("analyze")
}

#[test]
fn lexical_oracle_module_small_talk_routes_to_chat() {
    let analysis = analyze("good morning");
    assert_eq!(analysis.route, Route::Chat);
    assert!(analysis.reply.is_some());
}

#[test]
fn lexical_oracle_module_verbs_pick_the_operation() {
    let create = analyze("create schedule name=Sync");
    assert_eq!(create.route, Route::Sql);
    assert_eq!(create.operation, Some(Operation::Insert));
    assert_eq!(create.entity_token.as_deref(), Some("schedule"));
    assert_eq!(create.extracted_values.get("name").map(String::as_str), Some("Sync"));

    let update = analyze("update customer id=3 city=Bergen");
    assert_eq!(update.operation, Some(Operation::Update));
    assert_eq!(update.entity_token.as_deref(), Some("customer"));
    assert_eq!(update.extracted_values.len(), 2);

    let read = analyze("show customers city: \"Oslo\"");
    assert_eq!(read.operation, Some(Operation::Select));
    assert_eq!(read.extracted_values.get("city").map(String::as_str), Some("Oslo"));
}

#[test]
fn lexical_oracle_module_entity_comes_before_values() {
    let analysis = analyze("add customer name=schedule");
    assert_eq!(analysis.entity_token.as_deref(), Some("customer"));
    assert_eq!(
        analysis.extracted_values.get("name").map(String::as_str),
        Some("schedule")
    );

    let multiword = analyze("new calendar entry");
    assert_eq!(multiword.entity_token.as_deref(), Some("schedule"));
}

#[test]
fn lexical_oracle_module_ambiguous_mentions_are_passed_through() {
    let analysis = analyze("list client");
    assert_eq!(analysis.route, Route::Sql);
    assert_eq!(analysis.entity_token.as_deref(), Some("list client"));
}

#[test]
fn lexical_oracle_module_deletes_are_refused_instead_of_read() {
    for text in ["delete schedule id=3", "please remove the customers"] {
        let analysis = analyze(text);
        assert_eq!(analysis.route, Route::Chat, "{text}");
        assert_eq!(analysis.operation, None);
        assert!(analysis
            .reply
            .as_deref()
            .unwrap_or_default()
            .starts_with("Deleting records is not supported"));
    }
    // a value that merely contains the word stays a read
    let read = analyze("show customers name=Drop Shipping Ltd");
    assert_eq!(read.operation, Some(Operation::Select));
}
