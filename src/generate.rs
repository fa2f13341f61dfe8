//! The generation run: requirements + template in, validated document out.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde_yaml::Value;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::document::{self, Template};
use crate::error::{GenerateError, InputRole};
use crate::model::TextModel;
use crate::prompt::build_prompt;
use crate::shape::{self, ValidationPolicy, ValidationReport};

/// Inputs of one run.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub requirements: PathBuf,
    pub template: PathBuf,
    pub role: String,
    pub policy: ValidationPolicy,
}

impl GenerateRequest {
    pub fn from_config(config: &Config) -> Self {
        Self {
            requirements: config.requirements_path(),
            template: config.template_path(),
            role: config.prompt.role.clone(),
            policy: ValidationPolicy::from_strict(config.validation.strict),
        }
    }
}

/// A parsed model response together with its validation report.
///
/// Under `ValidationPolicy::Lenient` the report may be non-empty.
#[derive(Debug, Clone)]
pub struct Generated {
    pub document: Value,
    pub report: ValidationReport,
}

/// A ready-to-send prompt and the template it was built from.
#[derive(Debug, Clone)]
pub struct PreparedPrompt {
    pub template: Template,
    pub prompt: String,
}

/// Load both inputs and build the prompt, without contacting the model.
pub fn prepare(request: &GenerateRequest) -> Result<PreparedPrompt, GenerateError> {
    let requirements = document::load_requirements(&request.requirements)?;
    let template = document::load_template(&request.template)?;
    let prompt = build_prompt(&request.role, &requirements, &template.serialized);
    debug!(prompt_bytes = prompt.len(), "prompt_built");
    Ok(PreparedPrompt { template, prompt })
}

/// Run the whole chain against `model`.
pub fn generate_spec(
    request: &GenerateRequest,
    model: &dyn TextModel,
) -> Result<Generated, GenerateError> {
    info!(
        requirements = %request.requirements.display(),
        template = %request.template.display(),
        model = model.name(),
        "generation_started"
    );

    let PreparedPrompt { template, prompt } = prepare(request)?;

    let started = Instant::now();
    let raw = model.generate(&prompt).map_err(|e| {
        warn!(error = %e, "model_invocation_failed");
        GenerateError::from(e)
    })?;
    info!(
        elapsed_secs = started.elapsed().as_secs_f64(),
        response_bytes = raw.len(),
        "model_response_received"
    );

    let document = document::parse_response(&raw).inspect_err(|e| {
        warn!(error = %e, "model_response_unparseable");
    })?;

    let report = shape::validate(&template.shape, &document);
    for violation in &report.violations {
        warn!(path = %violation.path(), violation = %violation, "shape_violation");
    }

    if !report.is_conforming() && request.policy == ValidationPolicy::Strict {
        return Err(GenerateError::Shape {
            violations: report.violations,
            raw,
        });
    }

    info!(violations = report.len(), "generation_finished");
    Ok(Generated { document, report })
}

/// Where a generated document goes.
pub enum Output<'a> {
    File(&'a Path),
    Stream(&'a mut dyn Write),
}

/// Label used for stream output in logs and errors.
const STREAM_LABEL: &str = "<stdout>";

/// Run the chain and deliver the document to `output`.
///
/// Nothing is written unless generation succeeds under the request's policy.
pub fn generate_to(
    request: &GenerateRequest,
    model: &dyn TextModel,
    output: Output<'_>,
) -> Result<Generated, GenerateError> {
    let generated = generate_spec(request, model)?;
    match output {
        Output::File(path) => {
            document::write_document(path, &generated.document)?;
            info!(path = %path.display(), "specification_saved");
        }
        Output::Stream(out) => {
            document::write_stream(out, Path::new(STREAM_LABEL), &generated.document)?;
            debug!("specification_streamed");
        }
    }
    Ok(generated)
}

/// Validate an existing document file against a template file.
pub fn check_document(template: &Path, document: &Path) -> Result<ValidationReport, GenerateError> {
    let template = document::load_mapping(template, InputRole::Template)?;
    let document = document::load_document(document)?;
    Ok(shape::validate(&template, &document))
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::fs;

    use super::*;
    use crate::model::ModelError;
    use crate::prompt::DEFAULT_ROLE;
    use crate::shape::ShapeViolation;
    use tempfile::TempDir;

    /// Returns a canned response and remembers the prompt it was given.
    struct CannedModel {
        response: Result<String, String>,
        seen: RefCell<Vec<String>>,
    }

    impl CannedModel {
        fn ok(text: &str) -> Self {
            Self {
                response: Ok(text.to_string()),
                seen: RefCell::new(Vec::new()),
            }
        }

        fn failing(status: u16) -> Self {
            Self {
                response: Err(status.to_string()),
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl TextModel for CannedModel {
        fn generate(&self, prompt: &str) -> Result<String, ModelError> {
            self.seen.borrow_mut().push(prompt.to_string());
            match &self.response {
                Ok(text) => Ok(text.clone()),
                Err(status) => Err(ModelError::Status {
                    status: status.parse().unwrap(),
                    message: "unavailable".to_string(),
                }),
            }
        }

        fn name(&self) -> &str {
            "canned"
        }
    }

    const REQUIREMENTS: &str = "8-bit up-counter with enable and synchronous reset";

    const TEMPLATE: &str = r#"
module_name: ""
inputs:
  - name: ""
    width: ""
    description: ""
outputs:
  - name: ""
    width: ""
    description: ""
"#;

    const FILLED: &str = r#"module_name: up_counter_8bit
inputs:
  - name: clk
    width: 1
    description: System clock, counter advances on the rising edge
  - name: rst
    width: 1
    description: Synchronous active-high reset
  - name: en
    width: 1
    description: Count enable
outputs:
  - name: count
    width: 8
    description: Current counter value
"#;

    fn fixture(template: &str) -> (TempDir, GenerateRequest) {
        let dir = TempDir::new().unwrap();
        let requirements = dir.path().join("requirements.txt");
        let template_path = dir.path().join("template.yaml");
        fs::write(&requirements, REQUIREMENTS).unwrap();
        fs::write(&template_path, template).unwrap();
        let request = GenerateRequest {
            requirements,
            template: template_path,
            role: DEFAULT_ROLE.to_string(),
            policy: ValidationPolicy::Strict,
        };
        (dir, request)
    }

    #[test]
    fn test_counter_end_to_end() {
        let (_dir, request) = fixture(TEMPLATE);
        let model = CannedModel::ok(FILLED);

        let generated = generate_spec(&request, &model).unwrap();
        assert!(generated.report.is_conforming());

        let keys: Vec<&str> = generated
            .document
            .as_mapping()
            .unwrap()
            .keys()
            .filter_map(Value::as_str)
            .collect();
        assert_eq!(keys, vec!["module_name", "inputs", "outputs"]);

        for section in ["inputs", "outputs"] {
            let items = generated.document[section].as_sequence().unwrap();
            assert!(!items.is_empty());
            for item in items {
                for field in ["name", "width", "description"] {
                    let value = &item[field];
                    assert!(!value.is_null(), "{section}.{field} missing");
                    assert_ne!(value, &Value::from(""), "{section}.{field} left blank");
                }
            }
        }
    }

    #[test]
    fn test_prompt_sent_to_model_carries_inputs() {
        let (_dir, request) = fixture(TEMPLATE);
        let model = CannedModel::ok(FILLED);
        generate_spec(&request, &model).unwrap();

        let seen = model.seen.borrow();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].contains(REQUIREMENTS));
        assert!(seen[0].contains("module_name: ''"));
    }

    #[test]
    fn test_missing_requirements_never_calls_model() {
        let (dir, mut request) = fixture(TEMPLATE);
        request.requirements = dir.path().join("absent.txt");
        let model = CannedModel::ok(FILLED);

        let err = generate_spec(&request, &model).unwrap_err();
        assert!(matches!(
            err,
            GenerateError::FileNotFound {
                role: InputRole::Requirements,
                ..
            }
        ));
        assert!(model.seen.borrow().is_empty());
    }

    #[test]
    fn test_invalid_template_never_calls_model() {
        let (_dir, request) = fixture("inputs: [\n");
        let model = CannedModel::ok(FILLED);
        assert!(matches!(
            generate_spec(&request, &model).unwrap_err(),
            GenerateError::Parse { .. }
        ));
        assert!(model.seen.borrow().is_empty());
    }

    #[test]
    fn test_model_failure_is_reported() {
        let (_dir, request) = fixture(TEMPLATE);
        let err = generate_spec(&request, &CannedModel::failing(503)).unwrap_err();
        assert!(matches!(
            err,
            GenerateError::Model(ModelError::Status { status: 503, .. })
        ));
    }

    #[test]
    fn test_unparseable_response_keeps_raw_text() {
        let (_dir, request) = fixture(TEMPLATE);
        let raw = "Sure! module_name: [oops\n";
        let err = generate_spec(&request, &CannedModel::ok(raw)).unwrap_err();
        assert!(matches!(err, GenerateError::Response { .. }));
        assert_eq!(err.raw_output(), Some(raw));
    }

    #[test]
    fn test_fenced_response_is_accepted() {
        let (_dir, request) = fixture(TEMPLATE);
        let fenced = format!("```yaml\n{}```\n", FILLED);
        let generated = generate_spec(&request, &CannedModel::ok(&fenced)).unwrap();
        assert_eq!(generated.document["module_name"], Value::from("up_counter_8bit"));
    }

    #[test]
    fn test_strict_policy_fails_on_violation() {
        let (_dir, request) = fixture(TEMPLATE);
        let partial = "module_name: c\ninputs:\n  - name: clk\n    width: 1\noutputs: []\n";
        match generate_spec(&request, &CannedModel::ok(partial)).unwrap_err() {
            GenerateError::Shape { violations, raw } => {
                assert_eq!(violations.len(), 1);
                assert_eq!(violations[0].path().to_string(), "inputs[0].description");
                assert!(matches!(violations[0], ShapeViolation::MissingKey { .. }));
                assert_eq!(raw, partial);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_lenient_policy_keeps_document() {
        let (_dir, mut request) = fixture(TEMPLATE);
        request.policy = ValidationPolicy::Lenient;
        let generated =
            generate_spec(&request, &CannedModel::ok("module_name: c\ninputs: none\n")).unwrap();
        let paths: Vec<String> = generated
            .report
            .violations
            .iter()
            .map(|v| v.path().to_string())
            .collect();
        assert_eq!(paths, vec!["inputs", "outputs"]);
        assert_eq!(generated.document["module_name"], Value::from("c"));
    }

    #[test]
    fn test_non_mapping_response_is_shape_failure() {
        let (_dir, request) = fixture(TEMPLATE);
        let err = generate_spec(&request, &CannedModel::ok("just a sentence")).unwrap_err();
        match err {
            GenerateError::Shape { violations, .. } => {
                assert_eq!(violations.len(), 1);
                assert!(violations[0].path().is_root());
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_prepare_without_model() {
        let (_dir, request) = fixture(TEMPLATE);
        let prepared = prepare(&request).unwrap();
        assert!(prepared.prompt.contains(REQUIREMENTS));
        assert_eq!(prepared.template.shape.len(), 3);
    }

    #[test]
    fn test_check_document() {
        let (dir, request) = fixture(TEMPLATE);
        let good = dir.path().join("good.yaml");
        let bad = dir.path().join("bad.yaml");
        fs::write(&good, FILLED).unwrap();
        fs::write(&bad, "module_name: x\n").unwrap();

        assert!(check_document(&request.template, &good).unwrap().is_conforming());
        assert_eq!(check_document(&request.template, &bad).unwrap().len(), 2);
    }

    #[test]
    fn test_strict_failure_writes_no_file() {
        let (dir, request) = fixture(TEMPLATE);
        let output = dir.path().join("spec.yaml");
        let err = generate_to(
            &request,
            &CannedModel::ok("module_name: c\n"),
            Output::File(&output),
        )
        .unwrap_err();
        assert!(matches!(err, GenerateError::Shape { .. }));
        assert!(!output.exists());
    }

    #[test]
    fn test_model_failure_writes_no_file() {
        let (dir, request) = fixture(TEMPLATE);
        let output = dir.path().join("spec.yaml");
        fs::write(&output, "previous: run\n").unwrap();
        generate_to(&request, &CannedModel::failing(500), Output::File(&output)).unwrap_err();
        assert_eq!(fs::read_to_string(&output).unwrap(), "previous: run\n");
    }

    #[test]
    fn test_lenient_run_writes_non_conforming_document() {
        let (dir, mut request) = fixture(TEMPLATE);
        request.policy = ValidationPolicy::Lenient;
        let output = dir.path().join("spec.yaml");
        let generated = generate_to(
            &request,
            &CannedModel::ok("module_name: c\n"),
            Output::File(&output),
        )
        .unwrap();
        assert_eq!(generated.report.len(), 2);

        let written: Value = serde_yaml::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(written, generated.document);
    }

    #[test]
    fn test_conforming_run_writes_file() {
        let (dir, request) = fixture(TEMPLATE);
        let output = dir.path().join("spec.yaml");
        generate_to(&request, &CannedModel::ok(FILLED), Output::File(&output)).unwrap();
        let text = fs::read_to_string(&output).unwrap();
        assert!(text.starts_with("module_name: up_counter_8bit\n"));
    }

    #[test]
    fn test_stream_output_writes_yaml_and_no_file() {
        let (dir, request) = fixture(TEMPLATE);
        let mut out = Vec::new();
        let generated =
            generate_to(&request, &CannedModel::ok(FILLED), Output::Stream(&mut out)).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, document::render(&generated.document).unwrap());
        assert!(text.starts_with("module_name: up_counter_8bit\n"));
        let entries = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 2, "only the two inputs exist");
    }

    #[test]
    fn test_stream_output_nothing_on_failure() {
        let (_dir, request) = fixture(TEMPLATE);
        let mut out = Vec::new();
        generate_to(
            &request,
            &CannedModel::ok("not: [valid"),
            Output::Stream(&mut out),
        )
        .unwrap_err();
        assert!(out.is_empty());
    }

    #[test]
    fn test_merge_key_response_conforms() {
        let (_dir, request) = fixture("a:\n  x: ''\n  y: ''\n");
        let generated = generate_spec(
            &request,
            &CannedModel::ok("defaults: &d {x: 1, y: 2}\na:\n  <<: *d\n"),
        )
        .unwrap();
        assert!(generated.report.is_empty());
    }

    #[test]
    fn test_merge_key_template_checks_expanded_fields() {
        let (_dir, request) = fixture(
            "port: &port {name: '', width: ''}\nclk:\n  <<: *port\n  description: ''\n",
        );
        let model = CannedModel::ok(
            "port: {name: p, width: 1}\nclk: {name: clk, width: 1, description: Clock}\n",
        );
        assert!(generate_spec(&request, &model).unwrap().report.is_conforming());
        assert!(!model.seen.borrow()[0].contains("<<"));

        let err = generate_spec(
            &request,
            &CannedModel::ok("port: {name: p, width: 1}\nclk: {description: Clock}\n"),
        )
        .unwrap_err();
        let GenerateError::Shape { violations, .. } = err else {
            panic!("expected shape failure");
        };
        let paths: Vec<String> = violations.iter().map(|v| v.path().to_string()).collect();
        assert_eq!(paths, vec!["clk.name", "clk.width"]);
    }

    #[test]
    fn test_request_from_config() {
        let mut config = Config::default();
        config.validation.strict = false;
        config.paths.template = "/tmp/t.yaml".to_string();
        let request = GenerateRequest::from_config(&config);
        assert_eq!(request.policy, ValidationPolicy::Lenient);
        assert_eq!(request.template, PathBuf::from("/tmp/t.yaml"));
        assert_eq!(request.role, DEFAULT_ROLE);
    }
}
