//! End-to-end resolution coverage over a fixture manifest: from authored
//! node/material names to the exact texture locations the pipeline would
//! fetch. No GPU or network involved.

use vitrine::manifest::{Channel, Manifest};
use vitrine::material::{Naming, plan_material};
use vitrine::resolve::SyntheticNaming;
use vitrine::resources::fetch::Location;

const MANIFEST: &str = r#"{
    "Gear_Housing": {
        "matMetal": { "BaseColor": "a.png", "Normal": "a_n.png", "ORM": "a_orm.png" },
        "matPaint": { "BaseColor": "b.png" }
    },
    "Axle": {
        "matRubber": { "BaseColor": "c.png", "ORM": "c_orm.png" }
    }
}"#;

fn manifest_naming() -> Naming {
    Naming::Manifest(Manifest::from_slice(MANIFEST.as_bytes()).unwrap())
}

fn base() -> Location {
    Location::parse("https://cdn.example.com/assets").unwrap()
}

#[test]
fn resolves_mesh_to_manifest_entry_and_texture_location() {
    let naming = manifest_naming();
    let chain = vec!["Gear_Housing_mesh_matMetal".to_string()];

    let plan = plan_material(&naming, &base(), &chain, None)
        .unwrap()
        .expect("mesh must resolve");

    assert_eq!(plan.part_key, "Gear_Housing");
    assert_eq!(plan.variant_key, "matMetal");
    assert_eq!(
        plan.base_color.as_ref().map(|l| l.to_string()),
        Some("https://cdn.example.com/assets/Gear_Housing/a.png".to_string())
    );
    // All three declared channels are planned.
    assert_eq!(plan.channels().count(), 3);
}

#[test]
fn material_name_selects_variant_with_partial_channels() {
    let naming = manifest_naming();
    let chain = vec!["Gear_Housing_01".to_string()];

    let plan = plan_material(&naming, &base(), &chain, Some("lambert_matPaint"))
        .unwrap()
        .expect("mesh must resolve");

    assert_eq!(plan.variant_key, "matPaint");
    // matPaint declares only a base color; nothing else is planned.
    let planned: Vec<Channel> = plan.channels().map(|(c, _)| c).collect();
    assert_eq!(planned, vec![Channel::BaseColor]);
}

#[test]
fn ancestor_chain_resolves_when_mesh_name_does_not() {
    let naming = manifest_naming();
    let chain = vec![
        "polySurface7".to_string(),
        "pivot_null".to_string(),
        "Axle_assembly".to_string(),
    ];

    let plan = plan_material(&naming, &base(), &chain, None)
        .unwrap()
        .expect("ancestor must resolve");
    assert_eq!(plan.part_key, "Axle");
    assert_eq!(plan.variant_key, "matRubber");
}

#[test]
fn unresolvable_mesh_reports_no_plan() {
    let naming = manifest_naming();
    let chain = vec!["polySurface7".to_string(), "group1".to_string()];

    let plan = plan_material(&naming, &base(), &chain, Some("lambert1")).unwrap();
    assert!(plan.is_none(), "caller must fall back to the flat material");
}

#[test]
fn synthetic_policy_always_plans_constructed_filenames() {
    let naming = Naming::Synthetic(SyntheticNaming {
        extension: "png".to_string(),
        ..SyntheticNaming::default()
    });
    let chain = vec!["SM_03_Brake_Disc_low".to_string()];

    let plan = plan_material(&naming, &base(), &chain, Some("matMetal"))
        .unwrap()
        .expect("synthetic policy has no failure mode");

    assert_eq!(plan.part_key, "03_brake_disc");
    assert_eq!(plan.variant_key, "matmetal");
    assert_eq!(
        plan.orm.as_ref().map(|l| l.to_string()),
        Some("https://cdn.example.com/assets/model_Metal_ORM.png".to_string())
    );

    // Even a completely uninformative mesh still gets the default variant.
    let chain = vec!["polySurface1".to_string()];
    let plan = plan_material(&naming, &base(), &chain, None)
        .unwrap()
        .expect("synthetic policy has no failure mode");
    assert_eq!(plan.variant_key, "matstandard");
    assert_eq!(
        plan.base_color.as_ref().map(|l| l.to_string()),
        Some("https://cdn.example.com/assets/model_Standard_BaseColor.png".to_string())
    );
}
