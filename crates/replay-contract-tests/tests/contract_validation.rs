//! Validates ingest contract fixtures against their frozen JSON schemas.

use jsonschema::JSONSchema;
use serde_json::Value;

fn load_json(path: &str) -> Value {
    let raw = std::fs::read_to_string(path).expect("json file should be readable");
    serde_json::from_str(&raw).expect("json file should be valid")
}

fn compile_validator(schema_name: &str) -> JSONSchema {
    let path = format!(
        concat!(env!("CARGO_MANIFEST_DIR"), "/../../contracts/{}.schema.json"),
        schema_name
    );
    let schema = load_json(&path);
    JSONSchema::compile(&schema).expect("schema should compile")
}

fn fixture(name: &str) -> Value {
    let path = format!(
        concat!(env!("CARGO_MANIFEST_DIR"), "/../../contracts/fixtures/{}.valid.json"),
        name
    );
    load_json(&path)
}

macro_rules! contract_test {
    ($test_name:ident, $schema:literal, $fixture:literal) => {
        #[test]
        fn $test_name() {
            let validator = compile_validator($schema);
            let instance = fixture($fixture);
            let result = validator.validate(&instance);
            if let Err(errors) = result {
                let messages: Vec<String> = errors.map(|error| error.to_string()).collect();
                panic!("{} should validate against {}: {messages:?}", $fixture, $schema);
            }
        }
    };
}

contract_test!(presign_request_matches_schema, "presign-request", "presign-request");
contract_test!(presign_response_matches_schema, "presign-response", "presign-response");
contract_test!(
    presign_response_skip_matches_schema,
    "presign-response",
    "presign-response-skip"
);
contract_test!(
    segment_presign_request_matches_schema,
    "segment-presign-request",
    "segment-presign-request"
);
contract_test!(
    segment_presign_response_matches_schema,
    "segment-presign-response",
    "segment-presign-response"
);
contract_test!(
    batch_complete_request_matches_schema,
    "batch-complete-request",
    "batch-complete-request"
);
contract_test!(
    segment_complete_request_matches_schema,
    "segment-complete-request",
    "segment-complete-request"
);
contract_test!(session_end_request_matches_schema, "session-end-request", "session-end-request");
contract_test!(
    replay_evaluate_request_matches_schema,
    "replay-evaluate-request",
    "replay-evaluate-request"
);
contract_test!(
    replay_evaluate_response_matches_schema,
    "replay-evaluate-response",
    "replay-evaluate-response"
);

#[test]
fn presign_request_rejects_unknown_content_type() {
    let validator = compile_validator("presign-request");
    let mut instance = fixture("presign-request");
    instance["contentType"] = Value::String("video".to_string());
    assert!(!validator.is_valid(&instance));
}

#[test]
fn segment_presign_request_rejects_unknown_kind() {
    let validator = compile_validator("segment-presign-request");
    let mut instance = fixture("segment-presign-request");
    instance["kind"] = Value::String("audio".to_string());
    assert!(!validator.is_valid(&instance));
}
