use synthpop_core::{ConstraintSpec, Variable};
use synthpop_generate::{EngineError, EngineOptions, ReconstructionEngine};
use synthpop_solve::{BuildError, SolveStatus};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .try_init();
}

fn pet_variables() -> Vec<Variable> {
    vec![
        Variable::new("animal", ["dog", "cat"]),
        Variable::new("size", ["small", "large"]),
    ]
}

fn pet_margins() -> Vec<ConstraintSpec> {
    vec![
        ConstraintSpec::margin(
            "animal_margin",
            ["animal"],
            [(vec!["dog"], 0.6), (vec!["cat"], 0.4)],
        ),
        ConstraintSpec::margin(
            "size_margin",
            ["size"],
            [(vec!["small"], 0.7), (vec!["large"], 0.3)],
        ),
    ]
}

#[test]
fn independence_is_recovered_without_cross_constraints() {
    init_tracing();
    let engine = ReconstructionEngine::new(EngineOptions::default());
    let result = engine.run(&pet_variables(), &pet_margins()).expect("run");

    assert_eq!(result.report.solver_status, Some(SolveStatus::Optimal));
    let expected = [0.42, 0.18, 0.28, 0.12];
    for (cell, want) in expected.iter().enumerate() {
        assert!(
            (result.table.mass(cell) - want).abs() < 1e-6,
            "cell {cell}: {} != {want}",
            result.table.mass(cell)
        );
    }
    assert!(result.dataset.is_some());
    assert!(result.report.residuals.iter().all(|r| r.within_tolerance));
}

#[test]
fn oversized_joint_target_names_both_specs() {
    init_tracing();
    let mut specs = pet_margins();
    specs.push(ConstraintSpec::margin(
        "dog_small_joint",
        ["animal", "size"],
        [(vec!["dog", "small"], 0.9)],
    ));

    let engine = ReconstructionEngine::new(EngineOptions::default());
    let err = engine.run(&pet_variables(), &specs).unwrap_err();
    match err {
        EngineError::Build(BuildError::ConflictingConstraint { first, second, .. }) => {
            assert_eq!(first, "animal_margin");
            assert_eq!(second, "dog_small_joint");
        }
        other => panic!("expected a constraint conflict, got {other:?}"),
    }
}

#[test]
fn jointly_unsatisfiable_margins_surface_solver_conflicts() {
    init_tracing();
    let mut specs = pet_margins();
    // both entries fit under every margin, but together they exceed the
    // dog mass: only the solver can detect this
    specs.push(ConstraintSpec::margin(
        "dog_joint",
        ["animal", "size"],
        [(vec!["dog", "small"], 0.35), (vec!["dog", "large"], 0.3)],
    ));

    let engine = ReconstructionEngine::new(EngineOptions::default());
    let err = engine.run(&pet_variables(), &specs).unwrap_err();
    match err {
        EngineError::Failed(report) => {
            assert_eq!(report.solver_status, Some(SolveStatus::Infeasible));
            assert!(report.conflicts.iter().any(|id| id == "animal_margin"));
            assert!(report.conflicts.iter().any(|id| id == "dog_joint"));
        }
        other => panic!("expected a failed run with diagnostics, got {other:?}"),
    }
}

#[test]
fn ipf_and_lp_agree_on_independent_margins() {
    init_tracing();
    let variables = vec![
        Variable::new("color", ["red", "blue", "green"]),
        Variable::new("shape", ["round", "square"]),
        Variable::new("size", ["small", "large"]),
    ];
    let specs = vec![
        ConstraintSpec::margin(
            "color_margin",
            ["color"],
            [
                (vec!["red"], 0.5),
                (vec!["blue"], 0.3),
                (vec!["green"], 0.2),
            ],
        ),
        ConstraintSpec::margin(
            "shape_margin",
            ["shape"],
            [(vec!["round"], 0.6), (vec!["square"], 0.4)],
        ),
        ConstraintSpec::margin(
            "size_margin",
            ["size"],
            [(vec!["small"], 0.7), (vec!["large"], 0.3)],
        ),
    ];

    let lp = ReconstructionEngine::new(EngineOptions::default())
        .run(&variables, &specs)
        .expect("lp run");
    let ipf = ReconstructionEngine::new(EngineOptions::ipf())
        .run(&variables, &specs)
        .expect("ipf run");

    assert!(ipf.report.ipf.as_ref().expect("ipf info").converged);
    for cell in 0..lp.table.space().cell_count() {
        assert!(
            (lp.table.mass(cell) - ipf.table.mass(cell)).abs() < 1e-6,
            "cell {cell} diverges between paths"
        );
    }
}

#[test]
fn conditionals_resolve_against_their_anchor_margin() {
    init_tracing();
    let specs = vec![
        ConstraintSpec::margin(
            "animal_margin",
            ["animal"],
            [(vec!["dog"], 0.6), (vec!["cat"], 0.4)],
        ),
        ConstraintSpec::conditional(
            "size_given_animal",
            ["size"],
            ["animal"],
            [
                (vec!["small"], vec!["dog"], 0.5),
                (vec!["large"], vec!["dog"], 0.5),
                (vec!["small"], vec!["cat"], 0.9),
                (vec!["large"], vec!["cat"], 0.1),
            ],
        ),
    ];

    let result = ReconstructionEngine::new(EngineOptions::default())
        .run(&pet_variables(), &specs)
        .expect("run");
    assert_eq!(result.report.solver_status, Some(SolveStatus::Optimal));
    assert!((result.table.mass(0) - 0.30).abs() < 1e-6); // dog,small
    assert!((result.table.mass(2) - 0.36).abs() < 1e-6); // cat,small
}

#[test]
fn proportional_mode_yields_exact_row_counts() {
    init_tracing();
    let engine = ReconstructionEngine::new(EngineOptions::proportional(97));
    let result = engine.run(&pet_variables(), &pet_margins()).expect("run");
    let dataset = result.dataset.expect("dataset");
    assert_eq!(dataset.records.len(), 97);
    assert_eq!(result.report.rows_sampled, 97);
}

#[test]
fn runs_are_deterministic_for_a_fixed_seed() {
    init_tracing();
    let options = EngineOptions {
        rows: 200,
        seed: 1234,
        ..EngineOptions::default()
    };
    let first = ReconstructionEngine::new(options.clone())
        .run(&pet_variables(), &pet_margins())
        .expect("first run");
    let second = ReconstructionEngine::new(options)
        .run(&pet_variables(), &pet_margins())
        .expect("second run");
    assert_eq!(first.dataset, second.dataset);
}

#[test]
fn zero_time_limit_surfaces_timeout_without_records() {
    init_tracing();
    let options = EngineOptions {
        time_limit_ms: Some(0),
        ..EngineOptions::default()
    };
    let result = ReconstructionEngine::new(options)
        .run(&pet_variables(), &pet_margins())
        .expect("run");
    assert_eq!(result.report.solver_status, Some(SolveStatus::Timeout));
    assert!(result.dataset.is_none());
    assert!(
        result
            .report
            .warnings
            .iter()
            .any(|issue| issue.code == "solver_timeout")
    );
}

#[test]
fn space_ceiling_fails_before_any_solve() {
    init_tracing();
    let options = EngineOptions {
        max_cells: 3,
        ..EngineOptions::default()
    };
    let err = ReconstructionEngine::new(options)
        .run(&pet_variables(), &pet_margins())
        .unwrap_err();
    match err {
        EngineError::Input(synthpop_core::Error::SpaceOverflow { cells, max_cells }) => {
            assert_eq!(cells, 4);
            assert_eq!(max_cells, 3);
        }
        other => panic!("expected SpaceOverflow, got {other:?}"),
    }
}

#[test]
fn report_serializes_for_the_external_writer() {
    init_tracing();
    let result = ReconstructionEngine::new(EngineOptions::default())
        .run(&pet_variables(), &pet_margins())
        .expect("run");
    let json = serde_json::to_value(&result.report).expect("serialize report");
    assert_eq!(json["solve_mode"], "lp");
    assert_eq!(json["solver_status"], "optimal");
    assert!(json["residuals"].as_array().is_some_and(|list| !list.is_empty()));
}
