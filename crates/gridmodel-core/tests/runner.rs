use gridmodel_core::storage::grd::parse_grd_content;
use gridmodel_core::{
    DisplayValue, LabelOverrides, LayoutConfig, ModelRunner, ParamValue, ParameterMap, Record, Section,
    Worksheet, load_parameter_defaults, parameters_from_toml, scenario_headers,
};
use pretty_assertions::assert_eq;
use std::io::Write;

const CLINIC: &str = r#"
# outputs
A5: "Outcome"
B5: "Base"
C5: "Expanded"
A6: "Patients"
B6: =G3*G4
C6: =B6*2
A7: "Cost per patient"
B7: =G5/B6
C7: =G5/C6
A8: "Capacity used"
B8: =B6/G6
C8: =C6/G6

# parameters
F3: "Clinics"
G3: 3
F4: "Patients per clinic"
G4: 40
F5: "Budget"
G5: 6000
F6: "Capacity"
G6: 400
"#;

fn clinic() -> Worksheet {
    parse_grd_content(CLINIC, "clinic").unwrap()
}

fn run(sheet: Worksheet, params: &ParameterMap) -> Vec<Section> {
    ModelRunner::default()
        .run(Some(sheet), "clinic.xlsx", params, &LabelOverrides::new())
        .unwrap()
        .sections
}

fn int(i: i64) -> DisplayValue {
    DisplayValue::Integer(i)
}

fn dec(d: f64) -> DisplayValue {
    DisplayValue::Decimal(d)
}

#[test]
fn test_outcome_table_without_banners_is_one_section() {
    let sections = run(clinic(), &ParameterMap::new());
    assert_eq!(
        sections,
        vec![Section::new(
            "Results",
            vec![
                Record::new()
                    .with("Outcome", DisplayValue::text("Patients"))
                    .with("Base", int(120))
                    .with("Expanded", int(240)),
                Record::new()
                    .with("Outcome", DisplayValue::text("Cost per patient"))
                    .with("Base", int(50))
                    .with("Expanded", int(25)),
                Record::new()
                    .with("Outcome", DisplayValue::text("Capacity used"))
                    .with("Base", dec(0.3))
                    .with("Expanded", dec(0.6)),
            ]
        )]
    );
}

#[test]
fn test_parameters_change_outputs() {
    let params = parameters_from_toml("Clinics = 5\n\"Patients per clinic\" = 10\n").unwrap();
    let sections = run(clinic(), &params);
    let patients = &sections[0].records[0];
    assert_eq!(patients.get("Base"), Some(&int(50)));
    assert_eq!(patients.get("Expanded"), Some(&int(100)));
}

#[test]
fn test_flat_keys_from_nested_params_match_band_names() {
    let params = parameters_from_toml("[Staffing]\nClinics = 1\n").unwrap();
    assert_eq!(params.get("\tClinics"), Some(&ParamValue::Number(1.0)));
    let sections = run(clinic(), &params);
    assert_eq!(sections[0].records[0].get("Base"), Some(&int(40)));
}

#[test]
fn test_runs_are_independent() {
    let first = run(clinic(), &ParameterMap::new());
    let mut params = ParameterMap::new();
    params.insert("Budget".into(), ParamValue::Number(1200.0));
    let changed = run(clinic(), &params);
    let again = run(clinic(), &ParameterMap::new());
    assert_eq!(first, again);
    assert_ne!(first, changed);
}

#[test]
fn test_broken_formula_only_zeroes_its_cell() {
    let mut sheet = clinic();
    sheet.set_input("C7", "=__import__(\"os\")");
    let sections = run(sheet, &ParameterMap::new());
    let cost = &sections[0].records[1];
    assert_eq!(cost.get("Base"), Some(&int(50)));
    assert_eq!(cost.get("Expanded"), Some(&dec(0.0)));
}

#[test]
fn test_generic_scan_prefers_larger_block() {
    let sheet = parse_grd_content(
        r#"
        A1: "Summary"
        B1: 1
        C1: 2
        B3: "Year"
        C3: 2030
        D3: 2031
        B4: "Cases"
        C4: 12.4
        D4: =C4*2
        B5: "Deaths"
        C5: 0.123
        D5: 0.5
        B6: "Blank"
        C6: 0
        D6: 0
        "#,
        "scan",
    )
    .unwrap();
    let sections = run(sheet, &ParameterMap::new());
    assert_eq!(sections.len(), 1);
    assert_eq!(sections[0].title, "Outputs");
    assert_eq!(sections[0].columns(), vec!["Year", "2030", "2031"]);
    assert_eq!(sections[0].records.len(), 3);
    assert_eq!(sections[0].records[0].get("2030"), Some(&int(12)));
    assert_eq!(sections[0].records[0].get("2031"), Some(&int(25)));
    assert_eq!(sections[0].records[1].get("2030"), Some(&dec(0.12)));
}

#[test]
fn test_no_table_yields_diagnostic_section() {
    let sheet = parse_grd_content("A1: \"Notes only\"\nB1: \"nothing numeric\"", "empty").unwrap();
    let sections = run(sheet, &ParameterMap::new());
    assert_eq!(sections.len(), 1);
    assert_eq!(sections[0].title, "Outputs");
    assert_eq!(
        sections[0].records[0].get("Error"),
        Some(&DisplayValue::text(
            "No Outcome found and no output table detected in A–E."
        ))
    );
}

#[test]
fn test_json_shape() {
    let output = ModelRunner::default()
        .run(Some(clinic()), "models/clinic.xlsx", &ParameterMap::new(), &LabelOverrides::new())
        .unwrap();
    let json = serde_json::to_value(&output).unwrap();
    assert_eq!(json["title"], "clinic");
    assert_eq!(json["description"], "Excel-driven model");
    assert_eq!(json["sections"][0]["title"], "Results");
    assert_eq!(json["sections"][0]["records"][0]["Outcome"], "Patients");
    assert_eq!(json["sections"][0]["records"][0]["Base"], 120);
    assert_eq!(json["sections"][0]["records"][2]["Base"], 0.3);
}

#[test]
fn test_parameter_defaults_and_headers() {
    let sheet = parse_grd_content(
        r#"
        A2: "Outcome"
        B2: "Low"
        D2: "High"
        F3: "Setting"
        F4: "  Clinics"
        G4: 3
        F5: "  Doubled"
        G5: =G4*2
        "#,
        "defaults",
    )
    .unwrap();
    let layout = LayoutConfig::default();
    let rows = load_parameter_defaults(&sheet, &layout);
    let keys: Vec<String> = rows.iter().map(|r| r.flat_key()).collect();
    assert_eq!(keys, vec!["Setting", "\tClinics", "\tDoubled"]);
    assert_eq!(rows[2].value, Some(ParamValue::Number(6.0)));

    let headers = scenario_headers(&sheet, &layout);
    assert_eq!(headers.len(), 2);
    assert_eq!(headers.get("D").map(String::as_str), Some("High"));
}

#[test]
fn test_run_file_reads_grd() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clinic.grd");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(CLINIC.as_bytes()).unwrap();
    drop(file);

    let output = ModelRunner::default()
        .run_file(&path, None, &ParameterMap::new(), &LabelOverrides::new())
        .unwrap();
    assert_eq!(output.title, "clinic");
    assert_eq!(output.sections[0].records.len(), 3);

    let err = ModelRunner::default()
        .run_file(&path, Some("Other"), &ParameterMap::new(), &LabelOverrides::new())
        .unwrap_err();
    assert!(matches!(err, gridmodel_core::ModelError::SheetNotFound(_)));
}

#[test]
fn test_blank_rows_end_the_outcome_table() {
    let mut grd = String::from("A2: \"Outcome\"\nB2: \"Base\"\n");
    for r in 3..=10 {
        grd.push_str(&format!("A{r}: \"Line {r}\"\nB{r}: ={r}*G3\n"));
    }
    grd.push_str("A14: \"Stray\"\nB14: 99\nF3: \"Scale\"\nG3: 2\n");
    let sheet = parse_grd_content(&grd, "lines").unwrap();

    let sections = run(sheet, &ParameterMap::new());
    assert_eq!(sections.len(), 1);
    let records = &sections[0].records;
    assert_eq!(records.len(), 8);
    assert_eq!(records[0].get("Outcome"), Some(&DisplayValue::text("Line 3")));
    assert_eq!(records[7].get("Base"), Some(&int(20)));
    assert!(records.iter().all(|r| r.get("Base") != Some(&int(99))));
}

#[test]
fn test_long_dependency_chain_runs() {
    let mut grd = String::from("A2: \"Outcome\"\nB2: \"Base\"\nA3: \"Total\"\nB3: =H3000\nF3: \"Step\"\nG3: 2\nH1: =G3\n");
    for r in 2..=3000 {
        grd.push_str(&format!("H{}: =H{}+G3\n", r, r - 1));
    }
    let sheet = parse_grd_content(&grd, "chain").unwrap();

    let sections = run(sheet.clone(), &ParameterMap::new());
    assert_eq!(sections[0].records[0].get("Base"), Some(&int(6000)));

    let params = parameters_from_toml("Step = 5\n").unwrap();
    let sections = run(sheet, &params);
    assert_eq!(sections[0].records[0].get("Base"), Some(&int(15000)));
}
