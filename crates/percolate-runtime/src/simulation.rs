//! The simulation driver.
//!
//! Owns the iteration loop and the snapshot discipline: at the start of each
//! iteration the committed network becomes the frozen read view, updates are
//! written to a separate current view, and the iteration only publishes once
//! every entity has been visited. A run moves `Initialized -> Running ->
//! Completed`, or to `Failed` on the first unrecoverable error; prior
//! committed iterations' output is left intact either way.

use percolate_dsl::PartialStateExpr;
use percolate_network::Graph;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::mem;
use tracing::{info, instrument, trace};

use crate::distribution;
use crate::error::{Error, Result};
use crate::output::{OutputSink, StateSample};
use crate::process::{Outcome, RuleProcess};

/// Run parameters, validated by [`Simulation::new`]
#[derive(Debug, Clone)]
pub struct SimulationOptions {
    pub iterations: usize,
    pub dt: f64,
    pub seed: u64,
    /// Emit a state sample every this many iterations (the last iteration is
    /// always sampled)
    pub sample_interval: usize,
    /// Also snapshot the network every this many iterations
    pub snapshot_interval: Option<usize>,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            iterations: 1,
            dt: 1.0,
            seed: 0,
            sample_interval: 1,
            snapshot_interval: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Initialized,
    Running,
    Completed,
    Failed,
}

/// One run: a process, a network, an RNG, and the loop that ties them
pub struct Simulation {
    process: RuleProcess,
    /// Current (write) view
    graph: Graph,
    /// Previous-iteration (read) view
    prev: Graph,
    rng: StdRng,
    options: SimulationOptions,
    state: RunState,
    time: f64,
}

impl Simulation {
    pub fn new(process: RuleProcess, graph: Graph, options: SimulationOptions) -> Result<Self> {
        if options.iterations == 0 {
            return Err(Error::configuration("iterations must be at least 1"));
        }
        if !options.dt.is_finite() || options.dt <= 0.0 {
            return Err(Error::configuration(format!(
                "dt must be a finite positive number, found {}",
                options.dt
            )));
        }
        if options.sample_interval == 0 {
            return Err(Error::configuration("sample interval must be at least 1"));
        }

        let prev = graph.clone();
        let rng = StdRng::seed_from_u64(options.seed);
        Ok(Self {
            process,
            graph,
            prev,
            rng,
            options,
            state: RunState::Initialized,
            time: 0.0,
        })
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    /// Deal initial states to every entity and take the initial census
    #[instrument(skip_all)]
    pub fn initialize(
        &mut self,
        node_distribution: Option<&[(PartialStateExpr, f64)]>,
        edge_distribution: Option<&[(PartialStateExpr, f64)]>,
    ) -> Result<()> {
        let deck = distribution::deal_states(
            self.process.node_model(),
            node_distribution,
            self.graph.node_count(),
            &mut self.rng,
        )?;
        for (node, state) in self.graph.nodes().zip(&deck) {
            self.process.node_model().write(state, self.graph.node_attrs_mut(node));
        }

        if self.process.edge_model().attrs().is_empty() {
            if edge_distribution.is_some() {
                return Err(Error::configuration(
                    "an edge state distribution was given but no edge attributes are declared",
                ));
            }
        } else {
            let deck = distribution::deal_states(
                self.process.edge_model(),
                edge_distribution,
                self.graph.edge_count(),
                &mut self.rng,
            )?;
            for (edge, state) in self.graph.edges().zip(&deck) {
                self.process.edge_model().write(state, self.graph.edge_attrs_mut(edge));
            }
        }

        self.process.initialize_counts(&self.graph)?;
        info!(
            nodes = self.graph.node_count(),
            edges = self.graph.edge_count(),
            "initial states dealt"
        );
        Ok(())
    }

    /// Run all iterations, reporting through `sink`
    #[instrument(skip_all, fields(iterations = self.options.iterations, dt = self.options.dt))]
    pub fn run(&mut self, sink: &mut dyn OutputSink) -> Result<()> {
        if self.state != RunState::Initialized {
            return Err(Error::configuration("this simulation has already run"));
        }
        self.state = RunState::Running;

        if let Err((iteration, err)) = self.run_inner(sink) {
            self.state = RunState::Failed;
            // best effort: the sink may be the thing that failed
            let _ = sink.run_failed(iteration, &err.to_string());
            return Err(err);
        }
        self.state = RunState::Completed;
        info!(iterations = self.options.iterations, "run completed");
        Ok(())
    }

    /// The fallible body of [`Simulation::run`]; errors carry the iteration
    /// they surfaced in so the failure report can name it
    fn run_inner(
        &mut self,
        sink: &mut dyn OutputSink,
    ) -> std::result::Result<(), (usize, Error)> {
        // iteration 0: the initial census
        let sample = self.build_sample(0);
        sink.state_sample(&sample)
            .map_err(|e| (0, Error::resource(0, e)))?;

        for iteration in 1..=self.options.iterations {
            if let Err(err) = self.step(iteration, sink) {
                // discard the partially written iteration; the read view
                // still holds the last committed one
                mem::swap(&mut self.prev, &mut self.graph);
                return Err((iteration, err));
            }
        }

        let end = self.options.iterations;
        sink.network_snapshot(end, &self.graph)
            .map_err(|e| (end, Error::resource(end, e)))?;
        sink.run_completed(end)
            .map_err(|e| (end, Error::resource(end, e)))?;
        Ok(())
    }

    fn step(&mut self, iteration: usize, sink: &mut dyn OutputSink) -> Result<()> {
        trace!(iteration, "iteration start");
        let dt = self.options.dt;

        // freeze the committed view; refresh the write view from it
        mem::swap(&mut self.prev, &mut self.graph);
        if self.process.constant_topology() {
            self.graph.copy_states_from(&self.prev);
        } else {
            self.graph = self.prev.clone();
        }

        if self.process.run_node_update() {
            for node in self.prev.nodes() {
                let outcome = self.process.update_node(&self.prev, node, &mut self.rng, dt)?;
                if let Outcome::Transitioned { to, .. } = outcome {
                    self.process
                        .node_model()
                        .write(&to, self.graph.node_attrs_mut(node));
                }
            }
        }

        if self.process.run_edge_update() {
            for edge in self.prev.edges() {
                let outcome = self.process.update_edge(&self.prev, edge, &mut self.rng, dt)?;
                if let Outcome::Transitioned { to, .. } = outcome {
                    self.process
                        .edge_model()
                        .write(&to, self.graph.edge_attrs_mut(edge));
                }
            }
        }

        self.time += dt;
        self.process.update_network(&mut self.graph, self.time);
        debug_assert!(self.process.counts_consistent(&self.graph));

        let last = iteration == self.options.iterations;
        if iteration % self.options.sample_interval == 0 || last {
            let sample = self.build_sample(iteration);
            sink.state_sample(&sample)
                .map_err(|e| Error::resource(iteration, e))?;
        }
        if let Some(every) = self.options.snapshot_interval {
            // the final snapshot is written separately after the loop
            if iteration % every == 0 && !last {
                sink.network_snapshot(iteration, &self.graph)
                    .map_err(|e| Error::resource(iteration, e))?;
            }
        }

        self.process.finish_iteration();
        Ok(())
    }

    fn build_sample(&self, iteration: usize) -> StateSample {
        let tracker = self.process.tracker();
        let mut counts = indexmap::IndexMap::new();
        let mut influx = indexmap::IndexMap::new();
        for slot in 0..tracker.target_count() {
            let text = tracker.target_text(slot).to_string();
            counts.insert(text.clone(), tracker.working_counts()[slot]);
            influx.insert(text, tracker.influx_counts()[slot]);
        }
        let transitions = self
            .process
            .transition_tally()
            .iter()
            .map(|((from, to), n)| (format!("{from} -> {to}"), *n))
            .collect();
        StateSample {
            iteration,
            time: self.time,
            counts,
            influx,
            transitions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{MemorySink, SinkError};
    use indexmap::IndexMap;
    use percolate_dsl::{ProcessDef, parse_partial_state_str};
    use percolate_network::NodeId;

    const SIS: &str = r#"
[NodeAttributes]
status = S, I

[MeanFieldStates]
{status:S}
{status:I}

[NodeRules]
{status:S} -> {status:I} = NN({status:I}) * beta
{status:I} -> {status:S} = delta
"#;

    fn sis(beta: f64, delta: f64) -> RuleProcess {
        let def = ProcessDef::parse(SIS).unwrap();
        let params: IndexMap<String, f64> = [
            ("beta".to_string(), beta),
            ("delta".to_string(), delta),
        ]
        .into_iter()
        .collect();
        RuleProcess::from_definition(&def, &params).unwrap()
    }

    fn ring(n: usize) -> Graph {
        let mut g = Graph::with_nodes(n);
        for i in 0..n {
            g.add_edge(NodeId(i), NodeId((i + 1) % n));
        }
        g
    }

    fn dist(entries: &[(&str, f64)]) -> Vec<(PartialStateExpr, f64)> {
        entries
            .iter()
            .map(|(t, w)| (parse_partial_state_str(t).unwrap(), *w))
            .collect()
    }

    #[test]
    fn test_options_validated() {
        let bad_dt = SimulationOptions {
            dt: 0.0,
            ..Default::default()
        };
        assert!(Simulation::new(sis(0.1, 0.1), ring(4), bad_dt).is_err());

        let bad_iters = SimulationOptions {
            iterations: 0,
            ..Default::default()
        };
        assert!(Simulation::new(sis(0.1, 0.1), ring(4), bad_iters).is_err());
    }

    #[test]
    fn test_lifecycle_and_initial_sample() {
        let options = SimulationOptions {
            iterations: 5,
            seed: 11,
            ..Default::default()
        };
        let mut sim = Simulation::new(sis(0.2, 0.1), ring(10), options).unwrap();
        assert_eq!(sim.state(), RunState::Initialized);

        sim.initialize(Some(&dist(&[("{status:S}", 8.0), ("{status:I}", 2.0)])), None)
            .unwrap();

        let mut sink = MemorySink::new();
        sim.run(&mut sink).unwrap();
        assert_eq!(sim.state(), RunState::Completed);

        // iteration 0 plus 5 sampled iterations
        assert_eq!(sink.samples.len(), 6);
        assert_eq!(sink.samples[0].iteration, 0);
        assert_eq!(sink.samples[0].counts["{status:S}"], 8);
        assert_eq!(sink.samples[0].counts["{status:I}"], 2);
        assert_eq!(sink.completed, Some(5));
        assert_eq!(sink.snapshots.len(), 1);

        // a second run on the same instance is refused
        assert!(sim.run(&mut MemorySink::new()).is_err());
    }

    #[test]
    fn test_counts_always_sum_to_population() {
        let options = SimulationOptions {
            iterations: 20,
            seed: 5,
            dt: 0.5,
            ..Default::default()
        };
        let mut sim = Simulation::new(sis(0.4, 0.2), ring(30), options).unwrap();
        sim.initialize(Some(&dist(&[("{status:S}", 25.0), ("{status:I}", 5.0)])), None)
            .unwrap();

        let mut sink = MemorySink::new();
        sim.run(&mut sink).unwrap();
        for sample in &sink.samples {
            let total: usize = sample.counts.values().sum();
            assert_eq!(total, 30);
        }
    }

    #[test]
    fn test_sample_interval_includes_last_iteration() {
        let options = SimulationOptions {
            iterations: 7,
            sample_interval: 3,
            seed: 2,
            ..Default::default()
        };
        let mut sim = Simulation::new(sis(0.1, 0.1), ring(6), options).unwrap();
        sim.initialize(None, None).unwrap();

        let mut sink = MemorySink::new();
        sim.run(&mut sink).unwrap();
        let iterations: Vec<usize> = sink.samples.iter().map(|s| s.iteration).collect();
        assert_eq!(iterations, vec![0, 3, 6, 7]);
    }

    /// Fails configured sink calls; everything else is recorded normally
    struct FailingSink {
        inner: MemorySink,
        fail_samples: bool,
        fail_completed: bool,
    }

    impl FailingSink {
        fn failing_samples() -> Self {
            Self {
                inner: MemorySink::new(),
                fail_samples: true,
                fail_completed: false,
            }
        }

        fn failing_completion() -> Self {
            Self {
                inner: MemorySink::new(),
                fail_samples: false,
                fail_completed: true,
            }
        }

        fn refuse() -> SinkError {
            SinkError::Io(std::io::Error::other("disk full"))
        }
    }

    impl OutputSink for FailingSink {
        fn resolved_config(&mut self, text: &str) -> std::result::Result<(), SinkError> {
            self.inner.resolved_config(text)
        }

        fn state_sample(&mut self, sample: &StateSample) -> std::result::Result<(), SinkError> {
            if self.fail_samples {
                return Err(Self::refuse());
            }
            self.inner.state_sample(sample)
        }

        fn network_snapshot(
            &mut self,
            iteration: usize,
            graph: &Graph,
        ) -> std::result::Result<(), SinkError> {
            self.inner.network_snapshot(iteration, graph)
        }

        fn run_completed(&mut self, iterations: usize) -> std::result::Result<(), SinkError> {
            if self.fail_completed {
                return Err(Self::refuse());
            }
            self.inner.run_completed(iterations)
        }

        fn run_failed(&mut self, iteration: usize, error: &str) -> std::result::Result<(), SinkError> {
            self.inner.run_failed(iteration, error)
        }
    }

    #[test]
    fn test_failed_iteration_exposes_last_committed_state() {
        // node 1 carries a value outside the declared domain; node 0 fires
        // its recovery rule with certainty earlier in the same iteration
        let mut graph = Graph::with_nodes(2);
        graph.add_edge(NodeId(0), NodeId(1));
        graph
            .node_attrs_mut(NodeId(0))
            .insert("status".to_string(), "I".to_string());
        graph
            .node_attrs_mut(NodeId(1))
            .insert("status".to_string(), "X".to_string());

        let mut sim =
            Simulation::new(sis(0.0, 50.0), graph, SimulationOptions::default()).unwrap();
        let mut sink = MemorySink::new();
        let err = sim.run(&mut sink).unwrap_err();
        assert!(err.to_string().contains("node 1"));
        assert_eq!(sim.state(), RunState::Failed);
        assert_eq!(sink.failed.as_ref().map(|(it, _)| *it), Some(1));

        // node 0's write from the aborted iteration must not leak out
        assert_eq!(sim.graph().node_attrs(NodeId(0))["status"], "I");
    }

    #[test]
    fn test_sink_failure_before_the_loop_fails_the_run() {
        let mut sim =
            Simulation::new(sis(0.1, 0.1), ring(4), SimulationOptions::default()).unwrap();
        sim.initialize(None, None).unwrap();

        let mut sink = FailingSink::failing_samples();
        assert!(sim.run(&mut sink).is_err());
        assert_eq!(sim.state(), RunState::Failed);
        assert_eq!(sink.inner.failed.as_ref().map(|(it, _)| *it), Some(0));
    }

    #[test]
    fn test_sink_failure_on_completion_fails_the_run() {
        let options = SimulationOptions {
            iterations: 3,
            ..Default::default()
        };
        let mut sim = Simulation::new(sis(0.1, 0.1), ring(4), options).unwrap();
        sim.initialize(None, None).unwrap();

        let mut sink = FailingSink::failing_completion();
        assert!(sim.run(&mut sink).is_err());
        assert_eq!(sim.state(), RunState::Failed);
        assert!(sink.inner.completed.is_none());
        assert_eq!(sink.inner.failed.as_ref().map(|(it, _)| *it), Some(3));
    }

    #[test]
    fn test_network_attrs_mirror_counts() {
        let options = SimulationOptions {
            iterations: 3,
            seed: 9,
            ..Default::default()
        };
        let mut sim = Simulation::new(sis(0.1, 0.1), ring(8), options).unwrap();
        sim.initialize(Some(&dist(&[("{status:S}", 4.0), ("{status:I}", 4.0)])), None)
            .unwrap();

        let mut sink = MemorySink::new();
        sim.run(&mut sink).unwrap();

        let attrs = sim.graph().graph_attrs();
        let s: usize = attrs["count({status:S})"].parse().unwrap();
        let i: usize = attrs["count({status:I})"].parse().unwrap();
        assert_eq!(s + i, 8);
        assert_eq!(attrs["time"], "3");
    }
}
