//! End-to-end conversion tests over the fixture forms.
//!
//! One fixture per dialect: an XFA template (`.xdp`), a plain XForms
//! document and an Orbeon Form Runner document.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{Duration, TimeZone, Utc};
use pretty_assertions::assert_eq;
use serde_json::Value;

use xmlform_converter::{
    convert, convert_at, convert_batch, Conversion, DialectTag, FieldDescriptor, FieldType,
    MappingConfig, OutputDocument, SourceDocument,
};

const TEMPLATE: &str = "HR0077E_work_search.xdp";
const XFORMS: &str = "contact_request.xml";
const FORM_RUNNER: &str = "child_benefit.xml";

fn fixture_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn load(name: &str) -> SourceDocument {
    let path = fixture_path(name);
    SourceDocument::from_path(&path)
        .unwrap_or_else(|e| panic!("Failed to load {}: {}", path.display(), e))
}

fn mapping() -> MappingConfig {
    MappingConfig::load(Some(&fixture_path("mapping.json"))).expect("mapping fixture is valid")
}

fn run(name: &str, mapping: Option<&MappingConfig>) -> Conversion {
    convert(&load(name), mapping).unwrap_or_else(|e| panic!("{name} failed to convert: {e}"))
}

fn field<'d>(doc: &'d OutputDocument, name: &str) -> &'d FieldDescriptor {
    doc.descriptors()
        .find(|d| d.code_context.name == name)
        .unwrap_or_else(|| panic!("no descriptor named {name}"))
}

fn rule<'d>(descriptor: &'d FieldDescriptor, rule_type: &str) -> Option<&'d Value> {
    descriptor
        .validation
        .iter()
        .find(|r| r.rule_type == rule_type)
        .map(|r| &r.value)
}

/// Serialized document with the timestamp removed.
fn without_timestamp(doc: &OutputDocument) -> Value {
    let mut value = serde_json::to_value(doc).unwrap();
    if let Some(obj) = value.as_object_mut() {
        obj.remove("lastModified");
    }
    value
}

#[test]
fn test_template_header() {
    let conversion = run(TEMPLATE, None);
    let doc = &conversion.document;

    assert_eq!(conversion.dialect, DialectTag::Template);
    assert_eq!(doc.version.as_deref(), Some("1.0"));
    assert_eq!(doc.ministry_id.as_deref(), Some("0"));
    assert_eq!(doc.title.as_deref(), Some("Work Search Activities"));
    assert_eq!(doc.form_id.as_deref(), Some("HR0077"));
    assert!(doc.id.as_deref().is_some_and(|id| id.len() == 36));
    assert!(doc.deployed_to.is_none());
}

#[test]
fn test_template_structure() {
    let doc = run(TEMPLATE, None).document;

    let top: Vec<(&str, FieldType)> = doc
        .data
        .items
        .iter()
        .map(|d| (d.code_context.name.as_str(), d.field_type))
        .collect();
    assert_eq!(
        top,
        vec![
            ("pageSet", FieldType::Group),
            ("FormTitle", FieldType::TextInfo),
            ("applicant", FieldType::Group),
            ("employer", FieldType::Group),
            ("employer", FieldType::Group),
            ("employer", FieldType::Group),
            ("method", FieldType::Group),
            ("comments", FieldType::TextArea),
            ("logo", FieldType::TextInfo),
        ]
    );

    let master = &doc.data.items[0];
    assert_eq!(master.label.as_deref(), Some("Master Page"));
    assert_eq!(master.items[0].label.as_deref(), Some("HR0077E (2016/03)"));
}

#[test]
fn test_first_name_is_text_input() {
    for name in [TEMPLATE, XFORMS] {
        let doc = run(name, None).document;
        let first = field(&doc, "firstName");
        assert_eq!(first.field_type, FieldType::TextInput, "{name}");
        assert_eq!(first.label.as_deref(), Some("First name"), "{name}");
        assert!(first.required, "{name}");
    }
}

#[test]
fn test_template_field_details() {
    let doc = run(TEMPLATE, None).document;

    let first = field(&doc, "firstName");
    assert_eq!(rule(first, "required"), Some(&Value::Bool(true)));
    assert_eq!(rule(first, "maxLength"), Some(&Value::from(40)));
    assert_eq!(first.properties.placeholder.as_deref(), Some("Enter your first name"));

    let phone = field(&doc, "phone");
    assert_eq!(phone.field_type, FieldType::Phone);
    let binding = phone.properties.databindings.as_ref().unwrap();
    assert_eq!(binding.source.as_deref(), Some("Contact"));

    assert_eq!(field(&doc, "signature").field_type, FieldType::Signature);
}

#[test]
fn test_date_mask_from_picture_clause() {
    let doc = run(TEMPLATE, None).document;

    let dob = field(&doc, "dateOfBirth");
    assert_eq!(dob.field_type, FieldType::Date);
    assert_eq!(dob.properties.mask.as_deref(), Some("yyyy-MM-dd"));

    let contact = field(&doc, "contactDate");
    assert_eq!(contact.properties.mask.as_deref(), Some("yyyy-MM-dd"));
}

#[test]
fn test_signed_date_cannot_be_in_future() {
    let now = Utc.with_ymd_and_hms(2024, 5, 17, 8, 30, 0).unwrap();
    let doc = convert_at(&load(TEMPLATE), None, now).unwrap().document;

    let signed = field(&doc, "dateSigned");
    assert_eq!(rule(signed, "maxDate"), Some(&Value::from("2024-05-17")));
    assert_eq!(rule(field(&doc, "dateOfBirth"), "maxDate"), None);
}

#[test]
fn test_three_occurrences_become_three_groups() {
    let doc = run(TEMPLATE, None).document;

    let employers: Vec<&FieldDescriptor> = doc
        .data
        .items
        .iter()
        .filter(|d| d.code_context.name == "employer")
        .collect();
    assert_eq!(employers.len(), 3);

    let occurrences: Vec<Option<usize>> = employers.iter().map(|g| g.properties.occurrence).collect();
    assert_eq!(occurrences, vec![Some(0), Some(1), Some(2)]);

    let ids: HashSet<&str> = employers.iter().map(|g| g.id.as_str()).collect();
    assert_eq!(ids.len(), 3);
    for group in &employers {
        assert_eq!(group.properties.repeater, Some(true));
        let names: Vec<&str> = group.items.iter().map(|d| d.code_context.name.as_str()).collect();
        assert_eq!(names, vec!["employerName", "contactDate"]);
    }
}

#[test]
fn test_exclusion_group_children_are_radios() {
    let doc = run(TEMPLATE, None).document;

    let method = field(&doc, "method");
    assert_eq!(method.label.as_deref(), Some("Contact method"));
    assert_eq!(method.items.len(), 2);
    let shared: HashSet<Option<&str>> = method
        .items
        .iter()
        .map(|d| d.properties.exclusive_group.as_deref())
        .collect();
    assert_eq!(shared.len(), 1);
    assert!(shared.iter().all(Option::is_some));
    assert!(method.items.iter().all(|d| d.field_type == FieldType::Radio));
}

#[test]
fn test_degraded_fields_need_manual_intervention() {
    let conversion = run(TEMPLATE, None);
    let report = &conversion.report;

    let manual: Vec<&str> = report
        .manual_intervention_needed()
        .iter()
        .map(|e| e.field.as_str())
        .collect();
    assert_eq!(manual, vec!["comments", "logo"]);
    assert_eq!(
        report.manual_intervention_needed()[0].raw.as_deref(),
        Some("checkSpelling(this.rawValue)")
    );
    assert!(report.errors().is_empty());

    // The unsupported control still yields a valid placeholder descriptor
    let logo = field(&conversion.document, "logo");
    assert_eq!(logo.field_type, FieldType::TextInfo);
}

#[test]
fn test_output_types_are_canonical() {
    let allowed: HashSet<&str> = FieldType::LEAF_TYPES
        .iter()
        .map(FieldType::as_str)
        .chain(["group"])
        .collect();

    for name in [TEMPLATE, XFORMS, FORM_RUNNER] {
        let json = serde_json::to_value(run(name, None).document).unwrap();
        let mut stack = vec![&json["data"]["items"]];
        while let Some(value) = stack.pop() {
            let Some(items) = value.as_array() else {
                continue;
            };
            for item in items {
                let ty = item["type"].as_str().unwrap();
                assert!(allowed.contains(ty), "{name}: unexpected type {ty}");
                stack.push(&item["items"]);
            }
        }
    }
}

#[test]
fn test_report_covers_every_descriptor() {
    for name in [TEMPLATE, XFORMS, FORM_RUNNER] {
        let conversion = run(name, Some(&mapping()));
        let report = &conversion.report;
        let descriptors = conversion.document.descriptors().count();

        assert_eq!(report.total(), descriptors, "{name}");
        assert_eq!(
            report.success().len() + report.errors().len() + report.manual_intervention_needed().len(),
            descriptors,
            "{name}"
        );

        let ids: HashSet<&str> = conversion.document.descriptors().map(|d| d.id.as_str()).collect();
        assert_eq!(ids.len(), descriptors, "{name}: ids must be unique");
    }
}

#[test]
fn test_conversion_is_deterministic() {
    let now = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
    let mapping = mapping();
    for name in [TEMPLATE, XFORMS, FORM_RUNNER] {
        let source = load(name);
        let first = convert_at(&source, Some(&mapping), now).unwrap();
        let second = convert_at(&source, Some(&mapping), now).unwrap();
        assert_eq!(
            serde_json::to_string(&first.document).unwrap(),
            serde_json::to_string(&second.document).unwrap(),
            "{name}"
        );
        assert_eq!(first.report, second.report, "{name}");

        let later = convert_at(&source, Some(&mapping), now + Duration::hours(2)).unwrap();
        assert_ne!(first.document.last_modified, later.document.last_modified);
        assert_eq!(
            without_timestamp(&first.document),
            without_timestamp(&later.document),
            "{name}"
        );
    }
}

#[test]
fn test_override_beats_heuristics() {
    let mapping = mapping();
    let doc = run(TEMPLATE, Some(&mapping)).document;

    let phone = field(&doc, "phone");
    assert_eq!(phone.field_type, FieldType::Email);
    assert_eq!(phone.label.as_deref(), Some("Contact email"));
    assert_eq!(doc.ministry_id.as_deref(), Some("12"));

    for group in doc.data.items.iter().filter(|d| d.code_context.name == "employer") {
        let contact = &group.items[1];
        assert_eq!(
            contact.help_text.as_deref(),
            Some("Day you contacted the employer")
        );
    }
}

#[test]
fn test_breadcrumb_override_in_form_runner() {
    let doc = run(FORM_RUNNER, Some(&mapping())).document;

    let province = field(&doc, "province");
    assert_eq!(province.field_type, FieldType::Radio);
    assert!(province.required);
    assert_eq!(rule(province, "required"), Some(&Value::Bool(true)));
    assert_eq!(province.properties.list_items.as_ref().map(Vec::len), Some(2));
}

#[test]
fn test_xforms_fields() {
    let conversion = run(XFORMS, None);
    let doc = &conversion.document;

    assert_eq!(conversion.dialect, DialectTag::XForms);
    assert_eq!(doc.title.as_deref(), Some("Contact request"));
    assert_eq!(doc.form_id.as_deref(), Some("contact_request"));
    assert!(doc.version.is_none());
    assert!(doc.ministry_id.is_none());
    assert!(doc.id.is_none());

    let email = field(doc, "email");
    assert_eq!(email.field_type, FieldType::Email);
    assert_eq!(rule(email, "pattern"), Some(&Value::from("^[^@]+@[^@]+$")));
    assert_eq!(email.validation[0].error_message, "Enter a valid email");

    assert_eq!(field(doc, "phone").field_type, FieldType::Phone);
    assert_eq!(field(doc, "preferredDate").field_type, FieldType::Date);

    let topic = field(doc, "topic");
    assert_eq!(topic.field_type, FieldType::Dropdown);
    assert_eq!(topic.properties.is_multi, Some(false));

    let message = field(doc, "message");
    assert_eq!(message.field_type, FieldType::TextArea);
    assert_eq!(rule(message, "maxLength"), Some(&Value::from(500)));

    let consent = field(doc, "consent");
    assert_eq!(consent.field_type, FieldType::Checkbox);
    assert_eq!(consent.value, Some(Value::Bool(false)));
    assert!(consent.required);

    assert_eq!(conversion.report.summary().success_rate, "100.00%");
}

#[test]
fn test_form_runner_fields() {
    let conversion = run(FORM_RUNNER, None);
    let doc = &conversion.document;

    assert_eq!(conversion.dialect, DialectTag::FormRunner);
    assert_eq!(doc.title.as_deref(), Some("Child benefit application"));
    assert_eq!(doc.form_id.as_deref(), Some("child_benefit"));

    let section = &doc.data.items[0];
    assert_eq!(section.field_type, FieldType::Group);
    assert_eq!(section.label.as_deref(), Some("Child"));

    let intro = field(doc, "intro");
    assert_eq!(intro.field_type, FieldType::TextInfo);
    assert_eq!(intro.label.as_deref(), Some("Fill in one form per child."));

    let name = field(doc, "child-name");
    assert_eq!(name.field_type, FieldType::TextInput);
    assert_eq!(name.help_text.as_deref(), Some("Legal name as on the birth certificate"));
    assert_eq!(name.validation[0].error_message, "Enter the child's name");

    let birth = field(doc, "birth-date");
    assert_eq!(birth.field_type, FieldType::Date);
    assert_eq!(birth.validation[0].error_message, "Date of birth is required");

    assert_eq!(field(doc, "parent-email").field_type, FieldType::Email);
    assert_eq!(field(doc, "province").field_type, FieldType::Dropdown);
}

#[test]
fn test_form_runner_repeat_grid() {
    let doc = run(FORM_RUNNER, None).document;

    let section = &doc.data.items[0];
    let siblings: Vec<&FieldDescriptor> = section
        .items
        .iter()
        .filter(|d| d.code_context.name == "grid-2")
        .collect();
    assert_eq!(siblings.len(), 2);

    let values: Vec<Option<&Value>> = siblings.iter().map(|g| g.items[0].value.as_ref()).collect();
    assert_eq!(values, vec![Some(&Value::from("Anna")), Some(&Value::from("Ben"))]);
    for group in siblings {
        assert_eq!(group.label.as_deref(), Some("Siblings"));
        assert_eq!(rule(&group.items[0], "maxLength"), Some(&Value::from(60)));
    }
}

#[test]
fn test_form_runner_report_buckets() {
    let report = run(FORM_RUNNER, None).report;

    let errors: Vec<&str> = report.errors().iter().map(|e| e.field.as_str()).collect();
    assert_eq!(errors, vec!["orphan"]);
    assert!(report.errors()[0].message.as_deref().unwrap_or_default().contains("bind"));

    let manual: Vec<&str> = report
        .manual_intervention_needed()
        .iter()
        .map(|e| e.field.as_str())
        .collect();
    assert_eq!(manual, vec!["birth-certificate"]);
}

#[test]
fn test_report_json_shape() {
    let report = run(TEMPLATE, None).report;
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["source"], Value::from(TEMPLATE));
    assert!(json.get("fatal").is_none());
    assert_eq!(json["summary"]["total_manual_intervention"], Value::from(2));
    assert_eq!(json["manual_intervention_needed"][1]["convertedType"], Value::from("text-info"));
    assert_eq!(
        json["manual_intervention_needed"][1]["sourcePath"],
        Value::from("form1/logo")
    );
}

#[test]
fn test_batch_isolates_failures() {
    let sources: Vec<SourceDocument> = [TEMPLATE, "malformed.xml", "unknown_dialect.xml", XFORMS]
        .into_iter()
        .map(load)
        .collect();
    let mapping = mapping();
    let outcomes = convert_batch(&sources, Some(&mapping), 4);

    let names: Vec<Option<&str>> = outcomes.iter().map(|o| o.name.as_deref()).collect();
    assert_eq!(
        names,
        vec![
            Some(TEMPLATE),
            Some("malformed.xml"),
            Some("unknown_dialect.xml"),
            Some(XFORMS)
        ]
    );

    let kinds: Vec<Option<&str>> = outcomes
        .iter()
        .map(|o| o.result.as_ref().err().map(|e| e.kind()))
        .collect();
    assert_eq!(kinds, vec![None, Some("MalformedSource"), Some("UnknownDialect"), None]);

    // Healthy files convert exactly as they would on their own
    for (outcome, source) in outcomes.iter().zip(&sources) {
        if let Ok(batched) = &outcome.result {
            let alone = convert(source, Some(&mapping)).unwrap();
            assert_eq!(
                without_timestamp(&batched.document),
                without_timestamp(&alone.document)
            );
            assert_eq!(batched.report, alone.report);
        }
    }
}

#[test]
fn test_invalid_mapping_is_fatal() {
    let err = MappingConfig::from_json(r#"{"mappings": [{"xmlPath": "a", "fieldType": "slider"}]}"#)
        .unwrap_err();
    assert_eq!(err.kind(), "InvalidMappingConfig");

    let err = MappingConfig::load(Some(&fixture_path("missing.json"))).unwrap_err();
    assert!(err.to_string().contains("missing.json"));
}

#[test]
fn test_same_named_leaves_keep_their_own_binds() {
    let doc = run("household.xml", None).document;

    let applicant = &doc.data.items[0];
    let employer = &doc.data.items[1];
    assert_eq!(applicant.code_context.name, "applicant");
    assert_eq!(employer.code_context.name, "employer");

    let applicant_name = &applicant.items[0];
    assert_eq!(applicant_name.label.as_deref(), Some("Your full name"));
    assert!(applicant_name.required);
    assert_eq!(rule(applicant_name, "maxLength"), None);

    let employer_name = &employer.items[0];
    assert_eq!(employer_name.label.as_deref(), Some("Employer name"));
    assert!(!employer_name.required);
    assert_eq!(rule(employer_name, "maxLength"), Some(&Value::from(80)));

    assert_eq!(applicant.items[1].field_type, FieldType::Date);
    assert_eq!(employer.items[1].field_type, FieldType::TextArea);
    assert_eq!(employer.items[1].label.as_deref(), Some("When did you start?"));
}
