//! Integration tests: configuration + engine + output
//!
//! These tests run whole coupling steps from a JSON configuration and check
//! what reaches the reservoirs, the breakthrough recorder and the CSV file.

use approx::assert_relative_eq;
use tempfile::NamedTempFile;

use rtcouple_rs::config::CouplingConfig;
use rtcouple_rs::models::{Collaborators, FirstOrderDecay, NoReaction};
use rtcouple_rs::output::{CsvConfig, CsvExporter, CsvMetadata, Exporter};
use rtcouple_rs::physics::{SoilProperties, Zone, river_flow};
use rtcouple_rs::prelude::*;

mod common;
use common::{
    CountingTransport, IdleTransport, RecordingReaction, hillslope, river_reach, sorbing_species, tracer_species,
};

// =================================================================================================
// Configuration
// =================================================================================================

#[test]
fn test_constant_rain_fills_reservoirs() {
    let config = CouplingConfig::from_json_str(
        r#"{
            "precipitation": { "mode": "constant" },
            "rain_chemistry": { "Na": 2e-5, "Cl": 1e-5 },
            "condensation": 3.0,
            "calibration": { "species": "Cl", "factor": 2.0 }
        }"#,
    )
    .unwrap();
    let hydro = hillslope(&[1.0, 1.0]);
    let mut engine = CouplingEngine::new(config, sorbing_species(), &hydro, Collaborators::default()).unwrap();
    engine.step(0, 60, &hydro).unwrap();

    let precipitation = engine.volume(engine.layout().precipitation());
    assert_relative_eq!(precipitation.total[0], 6e-5, max_relative = 1e-12);
    assert_relative_eq!(precipitation.total[1], 6e-5, max_relative = 1e-12);

    let boundary = engine.volume(engine.layout().boundary());
    assert_relative_eq!(boundary.total[1], 3e-5, max_relative = 1e-12);
    assert_eq!(boundary.total[1], boundary.reference[1]);
}

#[test]
fn test_series_change_reported_once() {
    let config = CouplingConfig::from_json_str(
        r#"{
            "precipitation": {
                "mode": "time_series",
                "series": {
                    "columns": ["Cl"],
                    "records": [{ "time": 0, "values": [1e-5] }, { "time": 120, "values": [4e-5] }]
                }
            }
        }"#,
    )
    .unwrap();
    let hydro = hillslope(&[1.0]);
    let mut engine = CouplingEngine::new(config, tracer_species(), &hydro, Collaborators::default()).unwrap();

    let changes: Vec<_> = (0..4).map(|k| engine.step(k * 60, 60, &hydro).unwrap().mapping.forcing_changes).collect();

    assert_eq!(changes[0], vec![(0, 1e-5)]);
    assert!(changes[1].is_empty());
    assert_eq!(changes[2], vec![(0, 4e-5)]);
    assert!(changes[3].is_empty());
    assert_eq!(engine.volume(engine.layout().precipitation()).total[0], 4e-5);
}

#[test]
fn test_unknown_rain_species_rejected_at_setup() {
    let config = CouplingConfig::from_json_str(r#"{ "rain_chemistry": { "Zn": 1e-6 } }"#).unwrap();
    let err = CouplingEngine::new(config, tracer_species(), &hillslope(&[1.0]), Collaborators::default()).unwrap_err();
    assert!(matches!(err, CouplingError::UnknownSpecies(name) if name == "Zn"));
}

#[test]
fn test_deep_zones_require_geology() {
    let config = CouplingConfig { deep_zones: true, ..Default::default() };
    let result = CouplingEngine::new(config, tracer_species(), &hillslope(&[1.0]), Collaborators::default());
    assert!(matches!(result, Err(CouplingError::Topology(_))));
}

#[test]
fn test_deep_zones_step() {
    let mut hydro = hillslope(&[1.0, 1.4]);
    for elem in &mut hydro.elements {
        elem.geology = Some(SoilProperties { depth: 10.0, ..Default::default() });
        elem.storage.deep_gw = 4.0;
        elem.storage.deep_unsat = 1.0;
        elem.flows.deep_lateral = [0.0, 1e-3, 0.0];
    }
    let config = CouplingConfig { deep_zones: true, ..Default::default() };
    let mut engine = CouplingEngine::new(config, tracer_species(), &hydro, Collaborators::default()).unwrap();
    engine.set_initial_concentrations(Zone::DeepGroundwater, &[1e-4]).unwrap();

    engine.step(0, 60, &hydro).unwrap();

    let deep = engine.layout().deep_groundwater(0).unwrap();
    assert_relative_eq!(engine.volume(deep).geometry.height_t, 4.0);
    assert!(engine.volume(deep).step_size > 0.0);
}

// =================================================================================================
// Controller cadence
// =================================================================================================

#[test]
fn test_reaction_delay_gates_transport() {
    let transport = CountingTransport::default();
    let collaborators = Collaborators::default().with_transport(transport.clone());
    let config = CouplingConfig { reaction_delay: 120, ..Default::default() };
    let hydro = hillslope(&[1.0]);
    let mut engine = CouplingEngine::new(config, tracer_species(), &hydro, collaborators).unwrap();

    let transported: Vec<bool> =
        (0..4).map(|k| engine.step(k * 60, 60, &hydro).unwrap().controller.transported).collect();

    assert_eq!(transported, vec![false, false, true, true]);
    assert_eq!(transport.calls(), 2);
}

#[test]
fn test_reaction_every_averaging_window() {
    let config = CouplingConfig { averaging_scale: 3, ..Default::default() };
    let collaborators = Collaborators::default()
        .with_transport(IdleTransport)
        .with_reaction(FirstOrderDecay { rates: vec![1e-4] });
    let hydro = hillslope(&[1.0]);
    let mut engine = CouplingEngine::new(config, tracer_species(), &hydro, collaborators).unwrap();
    engine.set_initial_concentrations(Zone::Groundwater, &[1.0]).unwrap();

    let reacted: Vec<bool> = (0..7).map(|k| engine.step(k * 60, 60, &hydro).unwrap().controller.reacted).collect();

    assert_eq!(reacted, vec![true, false, false, true, false, false, true]);
    // three reactions over one 60 s interval each
    let gw = engine.volume(engine.layout().groundwater(0));
    assert_relative_eq!(gw.total[0], (-1e-4 * 180.0f64).exp(), max_relative = 1e-9);
}

#[test]
fn test_reaction_interval_is_one_coupling_step() {
    let reaction = RecordingReaction::default();
    let config = CouplingConfig { averaging_scale: 3, ..Default::default() };
    let collaborators = Collaborators::default().with_transport(IdleTransport).with_reaction(reaction.clone());
    let hydro = hillslope(&[1.0, 1.0]);
    let mut engine = CouplingEngine::new(config, tracer_species(), &hydro, collaborators).unwrap();

    for k in 0..4 {
        engine.step(k * 60, 60, &hydro).unwrap();
    }

    // reactions at elapsed 0 and 180, each over two elements x two zones
    let intervals = reaction.intervals();
    assert_eq!(intervals.len(), 8);
    assert!(intervals.iter().all(|&dt| dt == 60.0));
}

#[test]
fn test_replay_speciates_hourly_without_reaction() {
    let config = CouplingConfig { replay: true, ..Default::default() };
    let hydro = hillslope(&[1.0]);
    let mut engine = CouplingEngine::new(config, tracer_species(), &hydro, Collaborators::default()).unwrap();

    let first = engine.step(0, 600, &hydro).unwrap();
    assert!(!first.controller.reacted);
    assert!(first.controller.speciated);

    let speciated: Vec<bool> =
        (1..7).map(|k| engine.step(k * 600, 600, &hydro).unwrap().controller.speciated).collect();
    assert_eq!(speciated, vec![false, false, false, false, false, true]);
}

// =================================================================================================
// Breakthrough and export
// =================================================================================================

fn reach_engine(config: CouplingConfig) -> (CouplingEngine, Hydrology) {
    let mut hydro = river_reach(3);
    hydro.rivers[2].flow[river_flow::DOWN_CHANNEL] = 0.5;
    for seg in &mut hydro.rivers {
        seg.storage.stage = 0.2;
    }
    let collaborators = Collaborators::default().with_transport(IdleTransport).with_reaction(NoReaction);
    let mut engine = CouplingEngine::new(config, tracer_species(), &hydro, collaborators).unwrap();
    engine.set_initial_concentrations(Zone::River, &[1e-3]).unwrap();
    (engine, hydro)
}

#[test]
fn test_breakthrough_follows_river_speciation() {
    let (scout, _) = reach_engine(CouplingConfig::default());
    let config = CouplingConfig { breakthrough: scout.layout().zone(Zone::River).collect(), ..Default::default() };

    let (mut engine, hydro) = reach_engine(config);
    engine.step(0, 60, &hydro).unwrap();

    let recorder = engine.breakthrough();
    let sample = recorder.latest().unwrap();
    // free-ion speciation: reference = total
    for k in 0..3 {
        assert_relative_eq!(recorder.value(sample, k, 0), -3.0, max_relative = 1e-12);
    }
}

#[test]
fn test_injection_blends_downstream_locations() {
    let (scout, _) = reach_engine(CouplingConfig::default());
    let rivers: Vec<usize> = scout.layout().zone(Zone::River).collect();
    let config = CouplingConfig {
        breakthrough: rivers.clone(),
        injection: Some(rtcouple_rs::config::Injection {
            location: rivers[1],
            species: "Cl".into(),
            concentration: 1e-2,
            flow_rate: 5.0,
        }),
        ..Default::default()
    };
    let (mut engine, hydro) = reach_engine(config);
    let report = engine.step(0, 60, &hydro).unwrap();

    // the day rolls over at elapsed 0: one sample of 0.5 · 86400 over 1440
    let q = 0.5 * 86_400.0 / 1440.0;
    assert_relative_eq!(report.daily_discharge, q, max_relative = 1e-12);

    let recorder = engine.breakthrough();
    let sample = recorder.latest().unwrap();
    let blended = ((1e-3 * q + 1e-2 * 5.0) / (q + 5.0)).log10();
    assert_relative_eq!(recorder.value(sample, 0, 0), -3.0, max_relative = 1e-12);
    assert_relative_eq!(recorder.value(sample, 1, 0), blended, max_relative = 1e-12);
    assert_relative_eq!(recorder.value(sample, 2, 0), blended, max_relative = 1e-12);
}

#[test]
fn test_breakthrough_csv_export() {
    let (scout, _) = reach_engine(CouplingConfig::default());
    let outlet = scout.layout().river(2).index();
    let config = CouplingConfig { breakthrough: vec![outlet], ..Default::default() };
    let (mut engine, hydro) = reach_engine(config);
    for k in 0..5 {
        engine.step(k * 60, 60, &hydro).unwrap();
    }

    let file = NamedTempFile::new().unwrap();
    let metadata = CsvMetadata { run_name: Some("reach".into()), stepsize: Some(60), ..Default::default() };
    let exporter = CsvExporter::new(CsvConfig::default().with_metadata(metadata));
    exporter.export(engine.breakthrough(), engine.species(), file.path()).unwrap();

    let content = std::fs::read_to_string(file.path()).unwrap();
    assert!(content.contains("# Run: reach"));
    assert!(content.contains("# Steps: 5"));
    let header = format!("Time (s),Cl@{outlet}");
    assert!(content.contains(&header));
    let rows: Vec<&str> = content.lines().filter(|l| !l.starts_with('#')).skip(1).collect();
    assert_eq!(rows.len(), 5);
    assert!(rows[4].starts_with("240,"));
}

#[test]
fn test_timings_accumulate() {
    let (mut engine, hydro) = reach_engine(CouplingConfig::default());
    for k in 0..3 {
        engine.step(k * 60, 60, &hydro).unwrap();
    }
    assert_eq!(engine.timings().steps, 3);
}
