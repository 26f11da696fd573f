//! Property tests over randomly generated workloads and targets.

use std::collections::HashMap;

use fleetgrid_core::{
    Cancellation, ClusterTarget, ResourceList, Taint, Toleration, Workload, WorkloadSpec,
};
use fleetgrid_scheduler::{
    AffinityAlgorithm, Algorithm, BalancedAlgorithm, BinPackAlgorithm, SchedulerError,
    SchedulingEngine, SpreadAlgorithm,
};
use proptest::prelude::*;

const ZONES: [&str; 3] = ["a", "b", "c"];

fn taint() -> Taint {
    Taint {
        key: "dedicated".to_string(),
        value: "batch".to_string(),
        effect: "NoSchedule".to_string(),
    }
}

fn arb_target() -> impl Strategy<Value = ClusterTarget> {
    (
        0i64..=1_000,
        0i64..=10_000,
        0i64..=1_000,
        0i64..=10_000,
        any::<bool>(),
        0usize..ZONES.len(),
    )
        .prop_map(|(cpu_cap, mem_cap, cpu_free, mem_free, tainted, zone)| ClusterTarget {
            name: String::new(),
            // Zero capacity and available > capacity are both allowed.
            available: ResourceList::new(cpu_free, mem_free),
            capacity: ResourceList::new(cpu_cap, mem_cap),
            taints: if tainted { vec![taint()] } else { Vec::new() },
            labels: HashMap::from([
                ("zone".to_string(), ZONES[zone].to_string()),
                ("region".to_string(), "eu-west-1".to_string()),
            ]),
        })
}

fn arb_targets() -> impl Strategy<Value = Vec<ClusterTarget>> {
    prop::collection::vec(arb_target(), 1..12).prop_map(|mut targets| {
        for (i, target) in targets.iter_mut().enumerate() {
            target.name = format!("cluster-{i}");
        }
        targets
    })
}

fn arb_workload() -> impl Strategy<Value = Workload> {
    (1i32..=6, 1i64..=500, 0i64..=5_000, any::<bool>()).prop_map(
        |(replicas, cpu, memory, tolerates)| Workload {
            name: "prop".to_string(),
            spec: WorkloadSpec {
                replicas,
                resources: ResourceList::new(cpu, memory),
                tolerations: if tolerates {
                    let t = taint();
                    vec![Toleration {
                        key: t.key,
                        value: t.value,
                        effect: t.effect,
                    }]
                } else {
                    Vec::new()
                },
                preferred_region: Some("us-east-1".to_string()),
                ..WorkloadSpec::default()
            },
        },
    )
}

fn eligible<'a>(workload: &Workload, targets: &'a [ClusterTarget]) -> Vec<&'a ClusterTarget> {
    targets
        .iter()
        .filter(|t| t.available.fits(&workload.spec.resources) && workload.tolerates_all(&t.taints))
        .collect()
}

proptest! {
    #[test]
    fn scores_stay_in_range(workload in arb_workload(), targets in arb_targets()) {
        let algorithms: Vec<Box<dyn Algorithm>> = vec![
            Box::new(BinPackAlgorithm::new()),
            Box::new(SpreadAlgorithm::new()),
            Box::new(AffinityAlgorithm::new()),
            Box::new(BalancedAlgorithm::new()),
        ];
        for algorithm in &algorithms {
            let scores = algorithm.score(&Cancellation::none(), &workload, &targets).unwrap();
            prop_assert_eq!(scores.len(), targets.len());
            for scored in &scores {
                prop_assert!(
                    scored.score.is_finite() && (0.0..=100.0).contains(&scored.score),
                    "{} produced {} for {:?}",
                    algorithm.name(),
                    scored.score,
                    scored.target
                );
            }
        }
    }

    #[test]
    fn schedule_is_deterministic(workload in arb_workload(), targets in arb_targets()) {
        let engine = SchedulingEngine::new();
        for strategy in engine.list_algorithms() {
            let first = engine.schedule(&Cancellation::none(), &workload, &targets, &strategy);
            let second = engine.schedule(&Cancellation::none(), &workload, &targets, &strategy);
            prop_assert_eq!(first, second);
        }
    }

    #[test]
    fn decisions_respect_eligibility_and_replicas(
        workload in arb_workload(),
        targets in arb_targets(),
    ) {
        let engine = SchedulingEngine::new();
        let expected = eligible(&workload, &targets);

        match engine.schedule(&Cancellation::none(), &workload, &targets, "binpack") {
            Ok(decision) => {
                let bound = expected.len().min(workload.spec.replicas as usize);
                prop_assert_eq!(decision.clusters.len(), bound);
                for name in &decision.clusters {
                    prop_assert!(expected.iter().any(|t| &t.name == name));
                }
            }
            Err(SchedulerError::NoEligibleTargets { candidates, .. }) => {
                prop_assert!(expected.is_empty());
                prop_assert_eq!(candidates, targets.len());
            }
            Err(other) => prop_assert!(false, "unexpected error {other}"),
        }
    }

    #[test]
    fn binpack_prefers_less_available(
        free in 0i64..=900,
        less in 1i64..=100,
        cpu in 0i64..=100,
    ) {
        let make = |available: i64| ClusterTarget {
            name: String::new(),
            available: ResourceList::new(available, available),
            capacity: ResourceList::new(1_000, 1_000),
            taints: Vec::new(),
            labels: HashMap::new(),
        };
        let workload = Workload {
            name: "w".to_string(),
            spec: WorkloadSpec {
                replicas: 1,
                resources: ResourceList::new(cpu, cpu),
                ..WorkloadSpec::default()
            },
        };
        let targets = [make(free), make(free + less)];
        let scores = BinPackAlgorithm::new()
            .score(&Cancellation::none(), &workload, &targets)
            .unwrap();
        prop_assert!(scores[0].score >= scores[1].score);
    }

    #[test]
    fn spread_top_score_is_a_minimum_domain(targets in arb_targets()) {
        let spread = SpreadAlgorithm::new();
        let workload = Workload { name: "w".to_string(), spec: WorkloadSpec::default() };
        let scores = spread.score(&Cancellation::none(), &workload, &targets).unwrap();
        let analysis = spread.analyze_distribution(&targets);
        let min_count = analysis.domain_counts.values().copied().min().unwrap();

        let best = scores
            .iter()
            .max_by(|a, b| a.score.total_cmp(&b.score))
            .unwrap();
        let domain = &best.target.labels["zone"];
        prop_assert_eq!(analysis.domain_counts[domain], min_count);
    }
}
