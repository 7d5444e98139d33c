use ow_core::{Tolerances, nearly_equal};
use ow_turbine::*;
use proptest::prelude::*;

fn definition_strategy() -> impl Strategy<Value = TurbineDefinition> {
    (1usize..40).prop_flat_map(|n| {
        (
            proptest::collection::vec(0.0f64..4000.0, n),
            proptest::collection::vec(0.0f64..1.2, n),
            proptest::collection::vec(0.0f64..25.0, n),
            20.0f64..200.0,
            20.0f64..250.0,
            500.0f64..15000.0,
            0.5f64..5.0,
            1u32..5,
        )
            .prop_map(
                move |(power_kw, thrust_coefficient, rotor_rpm, hub, rotor, rated, cut_in, blades)| {
                    TurbineDefinition {
                        hub_height_m: hub,
                        rotor_diameter_m: rotor,
                        rated_power_kw: rated,
                        cut_in_ms: cut_in,
                        cut_out_ms: 25.0,
                        blade_count: blades,
                        velocities_ms: (0..n).map(|i| i as f64 * 0.5).collect(),
                        power_kw,
                        thrust_coefficient,
                        rotor_rpm,
                        air_density_kg_m3: STANDARD_AIR_DENSITY,
                    }
                },
            )
    })
}

proptest! {
    #[test]
    fn decode_encode_preserves_tables_and_scalars(def in definition_strategy()) {
        let bytes = encode(&def, "PropTurbine", "generated").unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let back = decode_str(&text, std::path::Path::new("prop.owtg")).unwrap().definition;

        prop_assert_eq!(back.velocities_ms.len(), def.velocities_ms.len());
        let tol = Tolerances::default();
        for (a, b) in back.power_kw.iter().zip(&def.power_kw) {
            prop_assert!(nearly_equal(*a, *b, tol), "power {} vs {}", a, b);
        }
        for (a, b) in back.thrust_coefficient.iter().zip(&def.thrust_coefficient) {
            prop_assert!(nearly_equal(*a, *b, tol), "thrust {} vs {}", a, b);
        }
        for (a, b) in back.rotor_rpm.iter().zip(&def.rotor_rpm) {
            prop_assert!(nearly_equal(*a, *b, tol), "rpm {} vs {}", a, b);
        }
        prop_assert_eq!(back.hub_height_m, def.hub_height_m);
        prop_assert_eq!(back.rotor_diameter_m, def.rotor_diameter_m);
        prop_assert_eq!(back.rated_power_kw, def.rated_power_kw);
        prop_assert_eq!(back.cut_in_ms, def.cut_in_ms);
        prop_assert_eq!(back.cut_out_ms, def.cut_out_ms);
        prop_assert_eq!(back.blade_count, def.blade_count);
    }
}

fn sample() -> TurbineDefinition {
    TurbineDefinition {
        hub_height_m: 90.0,
        rotor_diameter_m: 100.0,
        rated_power_kw: 2500.0,
        cut_in_ms: 3.5,
        cut_out_ms: 25.0,
        blade_count: 3,
        velocities_ms: vec![3.0, 4.0, 5.0],
        power_kw: vec![10.0, 120.0, 300.0],
        thrust_coefficient: vec![0.88, 0.85, 0.8],
        rotor_rpm: vec![6.0, 7.5, 9.0],
        air_density_kg_m3: STANDARD_AIR_DENSITY,
    }
}

#[test]
fn file_roundtrip_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("repl.owtg");
    std::fs::write(&path, encode(&sample(), "ReplTurb", "replacement").unwrap()).unwrap();

    let file = read_owtg(&path).unwrap();
    assert_eq!(file.name, "ReplTurb");
    assert_eq!(file.definition, sample());
    assert_eq!(decode(&path).unwrap(), sample());
}

#[test]
fn rotor_diameter_rewrite_keeps_tables() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("a.owtg");
    let dst = dir.path().join("b.owtg");
    std::fs::write(&src, encode(&sample(), "ReplTurb", "replacement").unwrap()).unwrap();

    set_rotor_diameter(&src, &dst, 112.5).unwrap();
    let text = std::fs::read_to_string(&dst).unwrap();
    assert!(text.contains("<RotorDiameter value=\"112.50\"/>"));
    assert!(text.contains("<!DOCTYPE ReplTurb>"));

    let rewritten = decode(&dst).unwrap();
    assert_eq!(rewritten.rotor_diameter_m, 112.5);
    assert_eq!(rewritten.power_kw, sample().power_kw);
}

#[test]
fn invalid_definition_is_not_encoded() {
    let mut def = sample();
    def.thrust_coefficient.push(0.1);
    assert!(matches!(
        encode(&def, "T", "d"),
        Err(TurbineError::InvalidDefinition { .. })
    ));
}

#[test]
fn missing_file_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let err = decode(&dir.path().join("none.owtg")).unwrap_err();
    assert!(err.to_string().contains("none.owtg"));
}

#[test]
fn positions_file_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("positions.txt");
    let positions = vec![Position::new(457300.0, 4123400.5), Position::new(457800.0, 4123900.0)];
    std::fs::write(&path, format_positions(&positions)).unwrap();
    assert_eq!(read_positions(&path).unwrap(), positions);
}
