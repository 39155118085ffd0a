// SPDX-License-Identifier: MIT OR Apache-2.0
//! `nodeflow_runner` - run a saved graph from the command line.
//!
//! ```text
//! nodeflow_runner <graph.ron> [--entry <node-id>] [--config <engine.ron>]
//! nodeflow_runner --demo <out.ron> [--config <engine.ron>]
//! ```
//!
//! The graph is loaded with the built-in node catalog, one flow pass is run
//! from the entry node (by default the first `event_begin` node), and the
//! result is printed. `--demo` writes a sample graph first and runs it.

use nodeflow_graph::nodes::{BinaryMath, EventBegin, FloatConstant, GetVariable, LogValue, MathOp, SetVariable};
use nodeflow_graph::{
    builtin_registry, ConfigError, DocumentError, EngineConfig, Evaluator, Graph, GraphDocument, GraphError,
    Node, NodeId, PinDirection,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: nodeflow_runner <graph.ron> [--entry <node-id>] [--config <engine.ron>] [--demo <out.ron>]";

/// Runner failures outside the flow pass itself
#[derive(Debug, thiserror::Error)]
enum RunnerError {
    #[error("{0}")]
    Usage(String),

    #[error("Graph document: {0}")]
    Document(#[from] DocumentError),

    #[error("Engine config: {0}")]
    Config(#[from] ConfigError),

    #[error("Building demo graph: {0}")]
    Graph(#[from] GraphError),

    #[error("Graph has no event_begin node; pass --entry")]
    NoEntry,

    #[error("Entry node not found: {0}")]
    UnknownEntry(NodeId),
}

/// Parsed command line
#[derive(Debug, Default, PartialEq)]
struct Args {
    graph: Option<PathBuf>,
    entry: Option<NodeId>,
    config: Option<PathBuf>,
    demo: Option<PathBuf>,
}

impl Args {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self, RunnerError> {
        let mut parsed = Args::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            let mut value = |flag: &str| {
                args.next()
                    .ok_or_else(|| RunnerError::Usage(format!("{flag} needs a value")))
            };
            match arg.as_str() {
                "--entry" => {
                    let raw = value("--entry")?;
                    let id = raw
                        .parse()
                        .map_err(|_| RunnerError::Usage(format!("invalid node id '{raw}'")))?;
                    parsed.entry = Some(NodeId(id));
                }
                "--config" => parsed.config = Some(PathBuf::from(value("--config")?)),
                "--demo" => parsed.demo = Some(PathBuf::from(value("--demo")?)),
                flag if flag.starts_with("--") => {
                    return Err(RunnerError::Usage(format!("unknown option '{flag}'")));
                }
                _ if parsed.graph.is_some() => {
                    return Err(RunnerError::Usage(format!("unexpected argument '{arg}'")));
                }
                _ => parsed.graph = Some(PathBuf::from(arg)),
            }
        }

        if parsed.graph.is_none() {
            parsed.graph = parsed.demo.clone();
        }
        if parsed.graph.is_none() {
            return Err(RunnerError::Usage("missing graph file".to_string()));
        }
        Ok(parsed)
    }
}

/// Sample graph: `speed = 2 + 3`, then log `speed * 3`
fn demo_graph() -> Result<Graph, GraphError> {
    let mut graph = Graph::new("demo", Arc::new(builtin_registry()));
    let speed = graph.create_property("speed", Box::new(1.0_f32), None)?;

    let begin = graph.add_node(Box::new(EventBegin));
    let two = graph.add_node(Box::new(FloatConstant::new(2.0)));
    let three = graph.add_node(Box::new(FloatConstant::new(3.0)));
    let sum = graph.add_node(Box::new(BinaryMath::new(MathOp::Add)));
    let set = graph.add_node(Box::new(SetVariable::new(speed)));
    let get = graph.add_node(Box::new(GetVariable::new(speed)));
    let product = graph.add_node(Box::new(BinaryMath::new(MathOp::Multiply)));
    let log = graph.add_node(Box::new(LogValue::new("speed x3")));

    let flow = |graph: &Graph, node: NodeId, direction: PinDirection| {
        graph
            .flow_pin(node, direction)
            .ok_or(GraphError::UnknownNode(node))
    };
    let value = |graph: &Graph, node: NodeId, direction: PinDirection, index: usize| {
        graph
            .value_pin(node, direction, index)
            .ok_or(GraphError::UnknownNode(node))
    };

    for (from, to) in [(begin, set), (set, log)] {
        let out = flow(&graph, from, PinDirection::Output)?;
        let input = flow(&graph, to, PinDirection::Input)?;
        graph.create_link(out, input)?;
    }
    let wires = [
        (two, sum, 0),
        (three, sum, 1),
        (sum, set, 0),
        (get, product, 0),
        (three, product, 1),
        (product, log, 0),
    ];
    for (from, to, index) in wires {
        let out = value(&graph, from, PinDirection::Output, 0)?;
        let input = value(&graph, to, PinDirection::Input, index)?;
        graph.create_link(out, input)?;
    }
    Ok(graph)
}

fn find_entry(graph: &Graph, requested: Option<NodeId>) -> Result<NodeId, RunnerError> {
    match requested {
        Some(id) if graph.node(id).is_some() => Ok(id),
        Some(id) => Err(RunnerError::UnknownEntry(id)),
        None => graph
            .nodes()
            .find(|n| n.node_type() == EventBegin::KIND)
            .map(Node::id)
            .ok_or(RunnerError::NoEntry),
    }
}

/// Run one pass; `Ok(false)` means the pass itself failed
fn run(args: &Args) -> Result<bool, RunnerError> {
    let config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    if let Some(path) = &args.demo {
        demo_graph()?.to_document()?.save(path)?;
        info!("Wrote demo graph to {}", path.display());
    }

    let path = args
        .graph
        .as_ref()
        .ok_or_else(|| RunnerError::Usage("missing graph file".to_string()))?;
    let document = GraphDocument::load(path)?;
    let mut graph = Graph::from_document(Arc::new(builtin_registry()), &document)?;
    let entry = find_entry(&graph, args.entry)?;

    info!(graph = %graph.name, entry = %entry, "Running flow pass");
    let mut evaluator = Evaluator::with_config(config.evaluator);
    let ok = evaluator.evaluate_flow_pin_chain(&mut graph, entry);

    println!(
        "{}: {} flow steps, {} pulls",
        graph.name,
        evaluator.evaluated_count(),
        evaluator.pulled_count()
    );
    for property in graph.properties() {
        match property.value().to_json() {
            Ok(value) => println!("  {} = {value}", property.name()),
            Err(e) => println!("  {} = <{e}>", property.name()),
        }
    }
    if let (Some(code), Some(message)) = (evaluator.error_code(), evaluator.error_message()) {
        println!("failed ({code:?}): {message}");
    }
    Ok(ok)
}

fn main() -> ExitCode {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("nodeflow_graph=debug,nodeflow_runner=info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let result = Args::parse(std::env::args().skip(1)).and_then(|args| run(&args));
    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            error!("{e}");
            if matches!(e, RunnerError::Usage(_)) {
                eprintln!("{USAGE}");
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<Args, RunnerError> {
        Args::parse(list.iter().map(ToString::to_string))
    }

    #[test]
    fn test_parse_args() {
        let parsed = args(&["graph.ron", "--entry", "4", "--config", "engine.ron"]).unwrap();
        assert_eq!(parsed.graph, Some(PathBuf::from("graph.ron")));
        assert_eq!(parsed.entry, Some(NodeId(4)));
        assert_eq!(parsed.config, Some(PathBuf::from("engine.ron")));

        let demo = args(&["--demo", "out.ron"]).unwrap();
        assert_eq!(demo.graph, demo.demo);

        assert!(matches!(args(&[]), Err(RunnerError::Usage(_))));
        assert!(matches!(args(&["a.ron", "--entry"]), Err(RunnerError::Usage(_))));
        assert!(matches!(args(&["a.ron", "--entry", "x"]), Err(RunnerError::Usage(_))));
        assert!(matches!(args(&["a.ron", "b.ron"]), Err(RunnerError::Usage(_))));
        assert!(matches!(args(&["a.ron", "--verbose"]), Err(RunnerError::Usage(_))));
    }

    #[test]
    fn test_demo_graph_runs() {
        let mut graph = demo_graph().unwrap();
        let entry = find_entry(&graph, None).unwrap();
        let mut evaluator = Evaluator::new();
        assert!(evaluator.evaluate_flow_pin_chain(&mut graph, entry));
        assert_eq!(evaluator.evaluated_count(), 3);

        let speed = graph.find_property("speed").unwrap();
        assert_eq!(graph.property(speed).unwrap().get::<f32>(), Some(&5.0));
        let log = graph.nodes().find(|n| n.node_type() == LogValue::KIND).unwrap().id();
        let out = graph.value_pin(log, PinDirection::Output, 0).unwrap();
        assert_eq!(graph.pin_value::<f32>(out), Some(&15.0));

        assert!(matches!(
            find_entry(&graph, Some(NodeId(999))),
            Err(RunnerError::UnknownEntry(_))
        ));
    }
}
