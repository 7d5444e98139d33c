use ow_report::*;
use proptest::prelude::*;
use std::path::Path;

const TOL: f64 = 1e-12;

#[test]
fn scenario_site_cell_omitted_rows() {
    let text = "Site\tIndex\tGross [kWh]\tNet [kWh]\tArray Efficiency [%]\n\
                1\t1000.0\t900.0\t90.0\n\
                2\t0.0\t0.0\t0.0\n";
    let report = parse_report(text, Path::new("report.txt")).unwrap();
    assert!((report.summary.gross_gwh - 1000.0 / 1e6).abs() < TOL);
    assert!((report.summary.net_gwh - 900.0 / 1e6).abs() < TOL);
    assert!((report.summary.array_gwh.unwrap() - 900.0 / 1e6).abs() < TOL);
    assert_eq!(report.records.len(), 2);
    assert_eq!(report.summary.active_count, 1);
    assert_eq!(report.records[0].index, Some(1));
    assert_eq!(report.records[0].site, None);
}

#[test]
fn scenario_results_file() {
    let text = "2\tturbines\tNetEnergy=\t100.0\tx\ty\tz\n60.0\t70.0\n40.0\t50.0\n";
    let res = parse_results(text, Path::new("results.txt")).unwrap();
    assert_eq!(res.net_energy_kwh, 100.0);
    assert_eq!(res.net_by_turbine, vec![60.0, 40.0]);
    assert_eq!(res.gross_by_turbine, vec![70.0, 50.0]);
}

#[test]
fn inactive_turbine_is_excluded_from_totals_only() {
    let text = "Site\tIndex\tGross [kWh]\tNet [kWh]\tArray Efficiency [%]\n\
                S\t1\t2000\t1800\t95\n\
                S\t2\t-1\t0\t0\n\
                S\t3\t1000\t850\t90\n";
    let report = parse_report(text, Path::new("r.txt")).unwrap();
    assert_eq!(report.records.len(), 3);
    assert_eq!(report.active_records().count(), 2);
    assert!((report.summary.gross_gwh - 3000.0 / KWH_PER_GWH).abs() < TOL);
    assert!((report.summary.net_gwh - 2650.0 / KWH_PER_GWH).abs() < TOL);
    let expected_array = (0.01 * 95.0 * 2000.0 + 0.01 * 90.0 * 1000.0) / KWH_PER_GWH;
    assert!((report.summary.array_gwh.unwrap() - expected_array).abs() < TOL);
}

#[test]
fn read_report_and_scan_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.txt");
    std::fs::write(
        &path,
        "Failed to find and replace turbine type T1 with t1.owtg\n\
         Site\tIndex\tGross [kWh]\tNet [kWh]\n\
         S\t1\t10\t9\n",
    )
    .unwrap();
    let report = read_report(&path).unwrap();
    assert_eq!(report.engine_error_count(), 1);
    assert!(is_turbine_replacement_failure(&report.engine_errors[0]));
    assert_eq!(scan_engine_errors(&path).unwrap().len(), 1);
}

#[test]
fn read_missing_report_names_path() {
    let dir = tempfile::tempdir().unwrap();
    let err = read_report(&dir.path().join("gone.txt")).unwrap_err();
    assert!(err.to_string().contains("gone.txt"));
}

const COLUMNS: [&str; 8] = [
    "Site",
    "Index",
    "X[m]",
    "Y[m]",
    "Gross [kWh]",
    "Net [kWh]",
    "Array Efficiency [%]",
    "Free Speed [m/s]",
];

fn row_strategy() -> impl Strategy<Value = (f64, f64, f64)> {
    // gross (possibly inactive), net fraction, efficiency
    (prop_oneof![Just(0.0), 1.0f64..5.0e7], 0.5f64..1.0, 50.0f64..100.0)
}

fn render(order: &[usize], rows: &[(f64, f64, f64)]) -> String {
    let mut text = String::new();
    let header: Vec<&str> = order.iter().map(|i| COLUMNS[*i]).collect();
    text.push_str(&header.join("\t"));
    text.push('\n');
    for (n, (gross, frac, eff)) in rows.iter().enumerate() {
        let values = [
            "Site A".to_string(),
            (n + 1).to_string(),
            format!("{}", 1000.0 + n as f64),
            format!("{}", 2000.0 - n as f64),
            format!("{gross}"),
            format!("{}", gross * frac),
            format!("{eff}"),
            "7.5".to_string(),
        ];
        let cells: Vec<&str> = order.iter().map(|i| values[*i].as_str()).collect();
        text.push_str(&cells.join("\t"));
        text.push('\n');
    }
    text
}

proptest! {
    #[test]
    fn totals_do_not_depend_on_column_order(
        order in Just((0..COLUMNS.len()).collect::<Vec<usize>>()).prop_shuffle(),
        rows in proptest::collection::vec(row_strategy(), 1..20),
    ) {
        let canonical: Vec<usize> = (0..COLUMNS.len()).collect();
        let a = parse_report(&render(&canonical, &rows), Path::new("a.txt")).unwrap();
        let b = parse_report(&render(&order, &rows), Path::new("b.txt")).unwrap();

        prop_assert_eq!(a.records.len(), rows.len());
        prop_assert_eq!(&a.records, &b.records);
        prop_assert!((a.summary.gross_gwh - b.summary.gross_gwh).abs() <= 1e-9);
        prop_assert!((a.summary.net_gwh - b.summary.net_gwh).abs() <= 1e-9);
        prop_assert!((a.summary.array_gwh.unwrap() - b.summary.array_gwh.unwrap()).abs() <= 1e-9);
        prop_assert_eq!(a.summary.active_count, rows.iter().filter(|r| r.0 > 0.0).count());
    }
}
