//! [`GraphBuilder`] – link resolution with required/optional/fallback
//! policy.
//!
//! The builder runs once at startup, issuing link requests in a fixed
//! dependency order and resolving each against the runtime-available node
//! set. A *required* link whose source or destination is missing, or whose
//! shapes mismatch, aborts assembly with a fatal error. An *optional* link
//! under the same conditions is skipped: a [`Degradation`] is recorded, a
//! warning logged, and the rest of the graph still assembles.
//!
//! Fallback chains are resolved as data (an ordered candidate list probed
//! once at build time) rather than exception-driven control flow. The
//! first candidate whose source port exists and type-matches wins; when
//! none match, the destination keeps its default value.

use strider_types::{Direction, Shape, StriderError};
use tracing::{debug, warn};

use crate::graph::{Graph, Link};
use crate::node::{InitContext, Node};

/// Record of an optional link that could not be resolved. Assembly
/// continued; the destination port retains its default (or prior) value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Degradation {
    /// Destination as `"node.port"`.
    pub destination: String,
    /// Why the link was skipped.
    pub detail: String,
}

/// Assembles a [`Graph`] from nodes and link requests.
pub struct GraphBuilder {
    ctx: InitContext,
    graph: Graph,
    degradations: Vec<Degradation>,
}

impl GraphBuilder {
    /// Create a builder; `ctx` is handed to every node's `initialize`.
    pub fn new(ctx: InitContext) -> Self {
        Self {
            ctx,
            graph: Graph::new(),
            degradations: Vec::new(),
        }
    }

    /// Initialize and insert a node. Nodes must be added in dependency
    /// order; insertion order is the per-cycle execution order.
    ///
    /// # Errors
    ///
    /// `StriderError::Config` on duplicate names or failed initialization.
    pub fn add_node(&mut self, node: Box<dyn Node>) -> Result<(), StriderError> {
        self.graph.add_node(node, &self.ctx)
    }

    /// Whether the named node is part of the graph. Used by topology code
    /// to probe for optional providers before wiring them.
    pub fn has_node(&self, name: &str) -> bool {
        self.graph.index_of(name).is_some()
    }

    /// Connect `src.src_port → dst.dst_port`.
    ///
    /// Returns `true` when a new link was created, `false` when the request
    /// was skipped (optional, unresolvable) or was an exact duplicate of an
    /// existing binding (idempotent re-run).
    ///
    /// # Errors
    ///
    /// - `StriderError::LinkResolution` when `required` and a node or port
    ///   is missing or the shapes mismatch.
    /// - `StriderError::LinkResolution` when the destination port is
    ///   already bound to a *different* source, regardless of `required`
    ///   (single-writer contract violation).
    pub fn connect(
        &mut self,
        src: &str,
        src_port: &str,
        dst: &str,
        dst_port: &str,
        required: bool,
    ) -> Result<bool, StriderError> {
        match self.resolve(src, src_port, dst, dst_port)? {
            Ok(Some(link)) => {
                debug!(
                    src = %format!("{src}.{src_port}"),
                    dst = %format!("{dst}.{dst_port}"),
                    "link resolved"
                );
                self.graph.push_link(link);
                Ok(true)
            }
            // Identical re-connect: already bound, nothing to do.
            Ok(None) => Ok(false),
            Err(detail) if required => Err(StriderError::LinkResolution(detail)),
            Err(detail) => {
                warn!(
                    dst = %format!("{dst}.{dst_port}"),
                    %detail,
                    "optional link skipped; destination keeps its default value"
                );
                self.degradations.push(Degradation {
                    destination: format!("{dst}.{dst_port}"),
                    detail,
                });
                Ok(false)
            }
        }
    }

    /// Try each `(src, src_port)` candidate in order and bind the first
    /// that resolves. Returns the index of the winning candidate, or `None`
    /// when none matched (a degradation is recorded and the destination
    /// keeps its safe default).
    ///
    /// # Errors
    ///
    /// `StriderError::LinkResolution` when the destination port is already
    /// bound to a source outside the candidate list.
    pub fn connect_with_fallback(
        &mut self,
        dst: &str,
        dst_port: &str,
        candidates: &[(&str, &str)],
    ) -> Result<Option<usize>, StriderError> {
        let mut failures = Vec::new();
        for (i, (src, src_port)) in candidates.iter().enumerate() {
            match self.resolve(src, src_port, dst, dst_port)? {
                Ok(Some(link)) => {
                    if i > 0 {
                        warn!(
                            dst = %format!("{dst}.{dst_port}"),
                            provider = %format!("{src}.{src_port}"),
                            "primary provider unavailable, bound fallback"
                        );
                    }
                    self.graph.push_link(link);
                    return Ok(Some(i));
                }
                // This candidate is already bound: earlier identical probe.
                Ok(None) => return Ok(Some(i)),
                Err(detail) => failures.push(detail),
            }
        }
        let detail = format!("no candidate resolved: {}", failures.join("; "));
        warn!(dst = %format!("{dst}.{dst_port}"), %detail, "fallback chain exhausted");
        self.degradations.push(Degradation {
            destination: format!("{dst}.{dst_port}"),
            detail,
        });
        Ok(None)
    }

    /// Optional links that could not be resolved so far.
    pub fn degradations(&self) -> &[Degradation] {
        &self.degradations
    }

    /// Borrow the graph under assembly.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Finish assembly, yielding the graph and the degradation records.
    pub fn finish(self) -> (Graph, Vec<Degradation>) {
        (self.graph, self.degradations)
    }

    /// Validate a single link request.
    ///
    /// Outer `Err` is a hard contract violation (conflicting binding).
    /// Inner `Ok(None)` means the identical binding already exists.
    /// Inner `Err(String)` is a soft resolution failure the caller may
    /// treat as fatal or degraded depending on the `required` flag.
    fn resolve(
        &self,
        src: &str,
        src_port: &str,
        dst: &str,
        dst_port: &str,
    ) -> Result<Result<Option<Link>, String>, StriderError> {
        let Some(src_idx) = self.graph.index_of(src) else {
            return Ok(Err(format!("source node '{src}' is not in the graph")));
        };
        let Some(dst_idx) = self.graph.index_of(dst) else {
            return Ok(Err(format!("destination node '{dst}' is not in the graph")));
        };

        let src_shape = self.graph.node_at(src_idx).port_shape(src_port, Direction::Output);
        let dst_shape = self.graph.node_at(dst_idx).port_shape(dst_port, Direction::Input);
        let (src_shape, dst_shape): (Shape, Shape) = match (src_shape, dst_shape) {
            (Some(s), Some(d)) => (s, d),
            (None, _) => {
                return Ok(Err(format!("'{src}' has no output port '{src_port}'")));
            }
            (_, None) => {
                return Ok(Err(format!("'{dst}' has no input port '{dst_port}'")));
            }
        };
        if src_shape != dst_shape {
            return Ok(Err(format!(
                "shape mismatch: {src}.{src_port} is {src_shape}, {dst}.{dst_port} is {dst_shape}"
            )));
        }

        if let Some(existing) = self.graph.binding(dst_idx, dst_port) {
            if existing.src == src_idx && existing.src_port == src_port {
                return Ok(Ok(None));
            }
            return Err(StriderError::LinkResolution(format!(
                "{dst}.{dst_port} is already bound to a different source \
                 (node #{}, port '{}')",
                existing.src, existing.src_port
            )));
        }

        Ok(Ok(Some(Link {
            src: src_idx,
            src_port: src_port.to_string(),
            dst: dst_idx,
            dst_port: dst_port.to_string(),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::test_support::ScaleNode;
    use strider_types::ModelDescriptor;

    fn builder() -> GraphBuilder {
        let ctx = InitContext {
            dt: 0.001,
            model: ModelDescriptor {
                name: "test".to_string(),
                joint_count: 2,
                urdf_path: None,
            },
        };
        let mut b = GraphBuilder::new(ctx);
        b.add_node(Box::new(ScaleNode::new("a", 2, 1.0))).unwrap();
        b.add_node(Box::new(ScaleNode::new("b", 2, 1.0))).unwrap();
        b.add_node(Box::new(ScaleNode::new("len3", 3, 1.0))).unwrap();
        b
    }

    #[test]
    fn required_link_between_existing_ports_resolves() {
        let mut b = builder();
        assert!(b.connect("a", "out", "b", "in", true).unwrap());
        assert_eq!(b.graph().links().len(), 1);
    }

    #[test]
    fn required_link_missing_source_is_fatal() {
        let mut b = builder();
        let err = b.connect("ghost", "out", "b", "in", true).unwrap_err();
        assert!(matches!(err, StriderError::LinkResolution(_)));
    }

    #[test]
    fn required_link_missing_port_is_fatal() {
        let mut b = builder();
        let err = b.connect("a", "nope", "b", "in", true).unwrap_err();
        assert!(matches!(err, StriderError::LinkResolution(_)));
    }

    #[test]
    fn required_link_shape_mismatch_is_fatal() {
        let mut b = builder();
        let err = b.connect("a", "out", "len3", "in", true).unwrap_err();
        assert!(matches!(err, StriderError::LinkResolution(_)));
    }

    #[test]
    fn optional_link_failure_records_degradation() {
        let mut b = builder();
        assert!(!b.connect("ghost", "out", "b", "in", false).unwrap());
        assert_eq!(b.degradations().len(), 1);
        assert_eq!(b.degradations()[0].destination, "b.in");
        // Assembly continues.
        assert!(b.connect("a", "out", "b", "in", true).unwrap());
    }

    #[test]
    fn identical_reconnect_is_idempotent() {
        let mut b = builder();
        assert!(b.connect("a", "out", "b", "in", true).unwrap());
        // Same request again: no new link, no error, even when required.
        assert!(!b.connect("a", "out", "b", "in", true).unwrap());
        assert_eq!(b.graph().links().len(), 1);
    }

    #[test]
    fn conflicting_binding_is_contract_violation() {
        let mut b = builder();
        b.add_node(Box::new(ScaleNode::new("c", 2, 1.0))).unwrap();
        b.connect("a", "out", "b", "in", true).unwrap();
        // Second writer for b.in, even optional, must error.
        let err = b.connect("c", "out", "b", "in", false).unwrap_err();
        assert!(matches!(err, StriderError::LinkResolution(_)));
    }

    #[test]
    fn fallback_prefers_first_matching_candidate() {
        let mut b = builder();
        let winner = b
            .connect_with_fallback("b", "in", &[("ghost", "out"), ("a", "out")])
            .unwrap();
        assert_eq!(winner, Some(1));
        assert_eq!(b.graph().links().len(), 1);
        assert!(b.degradations().is_empty());
    }

    #[test]
    fn fallback_exhausted_records_degradation() {
        let mut b = builder();
        let winner = b
            .connect_with_fallback("b", "in", &[("ghost", "out"), ("phantom", "dx")])
            .unwrap();
        assert_eq!(winner, None);
        assert!(b.graph().links().is_empty());
        assert_eq!(b.degradations().len(), 1);
    }

    #[test]
    fn fallback_skips_shape_mismatched_candidate() {
        let mut b = builder();
        // len3.out is vector<3>, b.in is vector<2>; a.out matches.
        let winner = b
            .connect_with_fallback("b", "in", &[("len3", "out"), ("a", "out")])
            .unwrap();
        assert_eq!(winner, Some(1));
    }
}
