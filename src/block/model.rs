//! Model tree: parents owning child blocks, plus the model's signal arena.

use tracing::warn;

use super::naming::{check_name, generate_name, NamingIssue, Renamed, SIGNAL_SEPARATOR};
use super::types::{BlockContext, BlockId, BlockIo};
use super::validate::validate_model;
use super::Block;
use crate::error::{DeadlockReport, FlowError, PortDirection, Result, UnprocessedBlock};
use crate::signal::{SignalId, SignalKind, SignalRegistry};

enum NodeKind {
    Parent {
        children: Vec<BlockId>,
        /// Counter for generated child block names
        block_counter: usize,
        /// Counter for anonymous signal labels
        signal_counter: usize,
    },
    Leaf {
        block: Box<dyn Block>,
        /// `None` until the block is connected
        io: Option<BlockIo>,
    },
}

struct Node {
    name: String,
    full_name: String,
    parent: Option<BlockId>,
    kind: NodeKind,
    processed: bool,
}

impl Node {
    fn parent_node(name: String, full_name: String, parent: Option<BlockId>) -> Self {
        Self {
            name,
            full_name,
            parent,
            kind: NodeKind::Parent {
                children: Vec::new(),
                block_counter: 0,
                signal_counter: 0,
            },
            processed: false,
        }
    }
}

/// Read-only view of a block handed to [`Model::visit`] callbacks.
#[derive(Clone, Copy)]
pub struct BlockRef<'a> {
    pub id: BlockId,
    pub name: &'a str,
    pub full_name: &'a str,
    pub is_parent: bool,
    pub processed: bool,
    /// Bound signals; `None` for parents and unconnected leaves
    pub io: Option<&'a BlockIo>,
}

/// A hierarchical block diagram and the signals it owns.
///
/// The model is the root parent. Submodels are parents nested inside it;
/// both exist only to own and name children. Leaf blocks do the work.
/// Children are kept in insertion order, which is the order the scheduler
/// tries them in.
pub struct Model {
    nodes: Vec<Node>,
    signals: SignalRegistry,
    /// Connected and unconnected leaves in depth-first order
    leaves: Vec<BlockId>,
    /// Bumped on every structural change
    generation: u64,
    renamed: Vec<Renamed>,
}

impl Model {
    /// Create an empty model. Invalid names fall back to `model`.
    pub fn new(name: &str) -> Self {
        let mut renamed = Vec::new();
        let name = match check_name(name) {
            None => name.to_string(),
            Some(issue) => {
                warn!(requested = name, %issue, "invalid model name, using \"model\"");
                renamed.push(Renamed {
                    requested: name.to_string(),
                    assigned: "model".to_string(),
                    issue,
                });
                "model".to_string()
            }
        };
        let full_name = format!("/{name}");
        Self {
            nodes: vec![Node::parent_node(name, full_name, None)],
            signals: SignalRegistry::new(),
            leaves: Vec::new(),
            generation: 0,
            renamed,
        }
    }

    /// The model itself, parent of all top-level blocks.
    pub fn root(&self) -> BlockId {
        BlockId::ROOT
    }

    /// Registry holding every signal of the model.
    pub fn signals(&self) -> &SignalRegistry {
        &self.signals
    }

    /// Mutable registry, used to feed external inputs between passes.
    pub fn signals_mut(&mut self) -> &mut SignalRegistry {
        &mut self.signals
    }

    /// Given (possibly substituted) name of a block.
    pub fn name(&self, id: BlockId) -> Result<&str> {
        Ok(&self.node(id)?.name)
    }

    /// Full hierarchical name, e.g. `/model/submodel/gain`.
    pub fn full_name(&self, id: BlockId) -> Result<&str> {
        Ok(&self.node(id)?.full_name)
    }

    /// Enclosing parent of a block; `None` for the root.
    pub fn parent(&self, id: BlockId) -> Result<Option<BlockId>> {
        Ok(self.node(id)?.parent)
    }

    /// Direct children in insertion order. Leaves have none.
    pub fn children(&self, id: BlockId) -> Result<&[BlockId]> {
        match &self.node(id)?.kind {
            NodeKind::Parent { children, .. } => Ok(children),
            NodeKind::Leaf { .. } => Ok(&[]),
        }
    }

    /// Leaf blocks in depth-first insertion order.
    pub fn leaves(&self) -> &[BlockId] {
        &self.leaves
    }

    /// Number of blocks including parents and the model itself.
    pub fn num_blocks(&self) -> usize {
        self.nodes.len()
    }

    /// Counter bumped whenever blocks are added or connected.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Every name substitution made so far.
    pub fn renamed(&self) -> &[Renamed] {
        &self.renamed
    }

    pub fn is_connected(&self, id: BlockId) -> bool {
        matches!(
            self.nodes.get(id.0).map(|n| &n.kind),
            Some(NodeKind::Leaf { io: Some(_), .. })
        )
    }

    /// Signals bound to a connected leaf.
    pub fn io(&self, id: BlockId) -> Option<&BlockIo> {
        match &self.nodes.get(id.0)?.kind {
            NodeKind::Leaf { io, .. } => io.as_ref(),
            NodeKind::Parent { .. } => None,
        }
    }

    /// Add a submodel under `parent`.
    pub fn add_submodel(&mut self, parent: BlockId, name: &str) -> Result<BlockId> {
        let name = self.assign_block_name(parent, name, "submodel")?;
        let full_name = format!("{}/{}", self.node(parent)?.full_name, name);
        let id = self.push_child(parent, Node::parent_node(name, full_name, Some(parent)))?;
        Ok(id)
    }

    /// Add an unconnected leaf block under `parent`.
    pub fn insert(&mut self, parent: BlockId, name: &str, block: impl Block + 'static) -> Result<BlockId> {
        self.insert_boxed(parent, name, Box::new(block))
    }

    pub fn insert_boxed(&mut self, parent: BlockId, name: &str, block: Box<dyn Block>) -> Result<BlockId> {
        let name = self.assign_block_name(parent, name, block.type_name())?;
        let full_name = format!("{}/{}", self.node(parent)?.full_name, name);
        let node = Node {
            name,
            full_name,
            parent: Some(parent),
            kind: NodeKind::Leaf { block, io: None },
            processed: false,
        };
        self.push_child(parent, node)
    }

    /// Bind a leaf to its input and output signals. A block can be
    /// connected only once.
    pub fn connect(&mut self, id: BlockId, inputs: &[SignalId], outputs: &[SignalId]) -> Result<()> {
        for sig in inputs.iter().chain(outputs) {
            self.signals.kind(*sig)?;
        }

        let Model {
            nodes,
            signals,
            generation,
            ..
        } = self;
        let node = nodes.get_mut(id.0).ok_or(FlowError::UnknownBlock { id: id.0 })?;
        match &mut node.kind {
            NodeKind::Parent { .. } => Err(FlowError::invalid_block(
                &node.full_name,
                "parents are not connected to signals",
            )),
            NodeKind::Leaf { io: Some(_), .. } => Err(FlowError::AlreadyConnected {
                block: node.full_name.clone(),
            }),
            NodeKind::Leaf { block, io } => {
                block
                    .num_inputs()
                    .check(&node.full_name, PortDirection::Input, inputs.len())?;
                block
                    .num_outputs()
                    .check(&node.full_name, PortDirection::Output, outputs.len())?;

                let mut bound = BlockIo::new(node.full_name.clone(), inputs, outputs);
                block.connect(&mut bound, signals)?;
                *io = Some(bound);
                *generation += 1;
                Ok(())
            }
        }
    }

    /// Insert and connect a leaf in one call.
    pub fn add_block(
        &mut self,
        parent: BlockId,
        name: &str,
        block: impl Block + 'static,
        inputs: &[SignalId],
        outputs: &[SignalId],
    ) -> Result<BlockId> {
        let id = self.insert(parent, name, block)?;
        self.connect(id, inputs, outputs)?;
        Ok(id)
    }

    /// Create a signal named `<parent full name>~<label>`.
    ///
    /// An empty label gets a generated one; a label with reserved
    /// characters is replaced and the substitution recorded.
    pub fn signal(&mut self, parent: BlockId, label: &str, kind: SignalKind) -> Result<SignalId> {
        let label = self.assign_signal_label(parent, label)?;
        let name = self.signal_name(parent, &label)?;
        self.signals.register(name, kind)
    }

    pub fn scalar(&mut self, parent: BlockId, label: &str) -> Result<SignalId> {
        self.signal(parent, label, SignalKind::Scalar)
    }

    pub fn array(&mut self, parent: BlockId, label: &str, size: usize) -> Result<SignalId> {
        self.signal(parent, label, SignalKind::Array(size))
    }

    pub fn int(&mut self, parent: BlockId, label: &str) -> Result<SignalId> {
        self.signal(parent, label, SignalKind::Int)
    }

    pub fn boolean(&mut self, parent: BlockId, label: &str) -> Result<SignalId> {
        self.signal(parent, label, SignalKind::Bool)
    }

    /// Create a bus signal grouping `members` under labels.
    pub fn bus(&mut self, parent: BlockId, label: &str, members: &[(&str, SignalId)]) -> Result<SignalId> {
        let label = self.assign_signal_label(parent, label)?;
        let name = self.signal_name(parent, &label)?;
        self.signals.register_bus(name, members)
    }

    /// Find a signal by label in `parent` or, failing that, its ancestors.
    pub fn lookup(&self, parent: BlockId, label: &str) -> Option<SignalId> {
        let mut scope = Some(parent);
        while let Some(id) = scope {
            let name = self.signal_name(id, label).ok()?;
            if let Some(sig) = self.signals.find(&name) {
                return Some(sig);
            }
            scope = self.nodes.get(id.0)?.parent;
        }
        None
    }

    /// Check that the model is ready to simulate. See [`validate_model`].
    pub fn validate(&self) -> Result<()> {
        validate_model(self)
    }

    /// Walk the tree depth first. The callback receives each block and its
    /// depth (the model is level 0); returning `false` stops the walk.
    pub fn visit(&self, mut cb: impl FnMut(BlockRef<'_>, u32) -> bool) -> bool {
        self.visit_from(BlockId::ROOT, 0, &mut cb)
    }

    fn visit_from(&self, id: BlockId, level: u32, cb: &mut impl FnMut(BlockRef<'_>, u32) -> bool) -> bool {
        let node = &self.nodes[id.0];
        let view = BlockRef {
            id,
            name: &node.name,
            full_name: &node.full_name,
            is_parent: matches!(node.kind, NodeKind::Parent { .. }),
            processed: self.is_processed(id),
            io: self.io(id),
        };
        if !cb(view, level) {
            return false;
        }
        if let NodeKind::Parent { children, .. } = &node.kind {
            for child in children {
                if !self.visit_from(*child, level + 1, cb) {
                    return false;
                }
            }
        }
        true
    }

    /// Whether a block ran in the current pass. A parent counts as
    /// processed once all of its children are.
    pub fn is_processed(&self, id: BlockId) -> bool {
        match self.nodes.get(id.0) {
            Some(Node {
                kind: NodeKind::Parent { children, .. },
                ..
            }) => children.iter().all(|c| self.is_processed(*c)),
            Some(node) => node.processed,
            None => false,
        }
    }

    pub(crate) fn mark_unprocessed(&mut self) {
        for node in &mut self.nodes {
            node.processed = false;
        }
    }

    /// Run one leaf if it has not run yet and all of its dependencies are
    /// assigned. Returns whether it ran.
    pub(crate) fn try_process(&mut self, id: BlockId, t: f64) -> Result<bool> {
        let Model { nodes, signals, .. } = self;
        let node = nodes.get_mut(id.0).ok_or(FlowError::UnknownBlock { id: id.0 })?;
        if node.processed {
            return Ok(false);
        }
        match &mut node.kind {
            NodeKind::Parent { .. } => Ok(false),
            NodeKind::Leaf { io: None, .. } => Err(FlowError::NotConnected {
                block: node.full_name.clone(),
            }),
            NodeKind::Leaf { block, io: Some(io) } => {
                if !io.dependencies().iter().all(|sig| signals.is_assigned(*sig)) {
                    return Ok(false);
                }
                block.activation_function(t, &mut BlockContext::new(io, signals))?;
                node.processed = true;
                Ok(true)
            }
        }
    }

    pub(crate) fn all_processed(&self) -> bool {
        self.leaves.iter().all(|id| self.nodes[id.0].processed)
    }

    /// Describe every leaf still unprocessed and what it waits on.
    pub fn unprocessed_report(&self, t: f64) -> DeadlockReport {
        let blocks = self
            .leaves
            .iter()
            .map(|id| &self.nodes[id.0])
            .filter(|node| !node.processed)
            .map(|node| {
                let unassigned = match &node.kind {
                    NodeKind::Leaf { io: Some(io), .. } => io
                        .dependencies()
                        .iter()
                        .filter(|sig| !self.signals.is_assigned(**sig))
                        .filter_map(|sig| self.signals.name(*sig).ok().map(str::to_string))
                        .collect(),
                    _ => Vec::new(),
                };
                UnprocessedBlock {
                    block: node.full_name.clone(),
                    unassigned,
                }
            })
            .collect();
        DeadlockReport { time: t, blocks }
    }

    /// Call `pre_step` on every leaf.
    pub(crate) fn pre_step(&mut self, t: f64) -> Result<()> {
        self.for_each_leaf(|block, ctx| block.pre_step(t, ctx))
    }

    /// Call `post_step` on every leaf.
    pub(crate) fn post_step(&mut self, t: f64) -> Result<()> {
        self.for_each_leaf(|block, ctx| block.post_step(t, ctx))
    }

    fn for_each_leaf(
        &mut self,
        mut f: impl FnMut(&mut dyn Block, &mut BlockContext<'_>) -> Result<()>,
    ) -> Result<()> {
        let Model {
            nodes,
            signals,
            leaves,
            ..
        } = self;
        for id in leaves.iter() {
            let node = &mut nodes[id.0];
            match &mut node.kind {
                NodeKind::Leaf { block, io: Some(io) } => {
                    f(block.as_mut(), &mut BlockContext::new(io, signals))?;
                }
                NodeKind::Leaf { io: None, .. } => {
                    return Err(FlowError::NotConnected {
                        block: node.full_name.clone(),
                    })
                }
                NodeKind::Parent { .. } => {}
            }
        }
        Ok(())
    }

    fn node(&self, id: BlockId) -> Result<&Node> {
        self.nodes.get(id.0).ok_or(FlowError::UnknownBlock { id: id.0 })
    }

    fn signal_name(&self, parent: BlockId, label: &str) -> Result<String> {
        Ok(format!("{}{}{}", self.node(parent)?.full_name, SIGNAL_SEPARATOR, label))
    }

    fn push_child(&mut self, parent: BlockId, node: Node) -> Result<BlockId> {
        let id = BlockId(self.nodes.len());
        let parent_node = self
            .nodes
            .get_mut(parent.0)
            .ok_or(FlowError::UnknownBlock { id: parent.0 })?;
        match &mut parent_node.kind {
            NodeKind::Parent { children, .. } => children.push(id),
            NodeKind::Leaf { .. } => {
                return Err(FlowError::NotAParent {
                    block: parent_node.full_name.clone(),
                })
            }
        }
        self.nodes.push(node);
        self.rebuild_leaf_order();
        self.generation += 1;
        Ok(id)
    }

    fn rebuild_leaf_order(&mut self) {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![BlockId::ROOT];
        while let Some(id) = stack.pop() {
            match &self.nodes[id.0].kind {
                NodeKind::Parent { children, .. } => stack.extend(children.iter().rev()),
                NodeKind::Leaf { .. } => order.push(id),
            }
        }
        self.leaves = order;
    }

    fn assign_block_name(&mut self, parent: BlockId, requested: &str, prefix: &str) -> Result<String> {
        let parent_name = self.node(parent)?.full_name.clone();
        let siblings: Vec<String> = match &self.node(parent)?.kind {
            NodeKind::Parent { children, .. } => children
                .iter()
                .map(|c| self.nodes[c.0].name.clone())
                .collect(),
            NodeKind::Leaf { .. } => return Err(FlowError::NotAParent { block: parent_name }),
        };

        let issue = check_name(requested).or_else(|| {
            siblings
                .iter()
                .any(|s| s == requested)
                .then_some(NamingIssue::Collision)
        });
        let Some(issue) = issue else {
            return Ok(requested.to_string());
        };

        let NodeKind::Parent { block_counter, .. } = &mut self.nodes[parent.0].kind else {
            return Err(FlowError::NotAParent { block: parent_name });
        };
        let assigned = generate_name(prefix, block_counter, |n| siblings.iter().any(|s| s == n));
        if issue != NamingIssue::Empty {
            warn!(parent = %parent_name, requested, assigned = %assigned, %issue, "block renamed");
        }
        self.renamed.push(Renamed {
            requested: requested.to_string(),
            assigned: assigned.clone(),
            issue,
        });
        Ok(assigned)
    }

    fn assign_signal_label(&mut self, parent: BlockId, requested: &str) -> Result<String> {
        let parent_node = self.node(parent)?;
        let parent_name = parent_node.full_name.clone();
        if let NodeKind::Leaf { .. } = parent_node.kind {
            return Err(FlowError::NotAParent { block: parent_name });
        }
        let Some(issue) = check_name(requested) else {
            return Ok(requested.to_string());
        };

        let prefix = self.signal_name(parent, "")?;
        let signals = &self.signals;
        let NodeKind::Parent { signal_counter, .. } = &mut self.nodes[parent.0].kind else {
            return Err(FlowError::NotAParent { block: parent_name });
        };
        let assigned = generate_name("s", signal_counter, |n| {
            signals.find(&format!("{prefix}{n}")).is_some()
        });
        if issue != NamingIssue::Empty {
            warn!(parent = %parent_name, requested, assigned = %assigned, %issue, "signal renamed");
            self.renamed.push(Renamed {
                requested: requested.to_string(),
                assigned: assigned.clone(),
                issue,
            });
        }
        Ok(assigned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{Const, Gain};

    #[test]
    fn test_hierarchical_names() {
        let mut model = Model::new("plant");
        let sub = model.add_submodel(model.root(), "engine").unwrap();
        let x = model.scalar(sub, "torque").unwrap();
        let y = model.scalar(sub, "out").unwrap();
        let g = model.add_block(sub, "gain", Gain::new(2.0), &[x], &[y]).unwrap();

        assert_eq!(model.full_name(model.root()).unwrap(), "/plant");
        assert_eq!(model.full_name(g).unwrap(), "/plant/engine/gain");
        assert_eq!(model.signals().name(x).unwrap(), "/plant/engine~torque");
    }

    #[test]
    fn test_anonymous_and_invalid_block_names_are_generated() {
        let mut model = Model::new("m");
        let root = model.root();
        let a = model.insert(root, "", Const::new(1.0)).unwrap();
        let b = model.insert(root, "bad/name", Const::new(1.0)).unwrap();
        let c = model.insert(root, "k", Const::new(1.0)).unwrap();
        let d = model.insert(root, "k", Const::new(1.0)).unwrap();

        assert_eq!(model.name(a).unwrap(), "const_0");
        assert_eq!(model.name(b).unwrap(), "const_1");
        assert_eq!(model.name(c).unwrap(), "k");
        assert_eq!(model.name(d).unwrap(), "const_2");

        let issues: Vec<_> = model.renamed().iter().map(|r| r.issue).collect();
        assert_eq!(
            issues,
            vec![NamingIssue::Empty, NamingIssue::InvalidCharacters, NamingIssue::Collision]
        );
    }

    #[test]
    fn test_generated_name_avoids_existing_sibling() {
        let mut model = Model::new("m");
        let root = model.root();
        model.insert(root, "const_0", Const::new(1.0)).unwrap();
        let b = model.insert(root, "", Const::new(1.0)).unwrap();
        assert_eq!(model.name(b).unwrap(), "const_1");
    }

    #[test]
    fn test_anonymous_signals_are_unique() {
        let mut model = Model::new("m");
        let root = model.root();
        let explicit = model.scalar(root, "s_0").unwrap();
        let anon = model.scalar(root, "").unwrap();
        assert_ne!(explicit, anon);
        assert_eq!(model.signals().name(anon).unwrap(), "/m~s_1");
        assert!(model.scalar(root, "s_0").is_err());
    }

    #[test]
    fn test_lookup_searches_ancestors() {
        let mut model = Model::new("m");
        let root = model.root();
        let sub = model.add_submodel(root, "sub").unwrap();
        let global = model.scalar(root, "g").unwrap();
        let local = model.scalar(sub, "l").unwrap();

        assert_eq!(model.lookup(sub, "g"), Some(global));
        assert_eq!(model.lookup(sub, "l"), Some(local));
        assert_eq!(model.lookup(root, "l"), None);
    }

    #[test]
    fn test_connect_twice_fails() {
        let mut model = Model::new("m");
        let root = model.root();
        let y = model.scalar(root, "y").unwrap();
        let c = model.insert(root, "c", Const::new(1.0)).unwrap();
        model.connect(c, &[], &[y]).unwrap();
        let err = model.connect(c, &[], &[y]).unwrap_err();
        assert!(matches!(err, FlowError::AlreadyConnected { ref block } if block == "/m/c"));
    }

    #[test]
    fn test_arity_mismatch_names_block() {
        let mut model = Model::new("m");
        let root = model.root();
        let x = model.scalar(root, "x").unwrap();
        let y = model.scalar(root, "y").unwrap();
        let err = model
            .add_block(root, "g", Gain::new(1.0), &[x, y], &[y])
            .unwrap_err();
        match err {
            FlowError::ArityMismatch {
                block,
                direction,
                expected,
                actual,
            } => {
                assert_eq!(block, "/m/g");
                assert_eq!(direction, PortDirection::Input);
                assert_eq!(expected, 1);
                assert_eq!(actual, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_leaf_cannot_own_children() {
        let mut model = Model::new("m");
        let root = model.root();
        let c = model.insert(root, "c", Const::new(1.0)).unwrap();
        assert!(matches!(
            model.insert(c, "x", Const::new(1.0)).unwrap_err(),
            FlowError::NotAParent { .. }
        ));
        assert!(matches!(
            model.scalar(c, "x").unwrap_err(),
            FlowError::NotAParent { .. }
        ));
        assert!(matches!(
            model.bus(c, "b", &[]).unwrap_err(),
            FlowError::NotAParent { .. }
        ));
        assert!(model.signals().find("/m/c~x").is_none());
    }

    #[test]
    fn test_visit_depth_first_with_levels() {
        let mut model = Model::new("m");
        let root = model.root();
        let sub = model.add_submodel(root, "sub").unwrap();
        model.insert(sub, "a", Const::new(1.0)).unwrap();
        model.insert(root, "b", Const::new(1.0)).unwrap();

        let mut seen = Vec::new();
        model.visit(|b, level| {
            seen.push((b.full_name.to_string(), level));
            true
        });
        assert_eq!(
            seen,
            vec![
                ("/m".to_string(), 0),
                ("/m/sub".to_string(), 1),
                ("/m/sub/a".to_string(), 2),
                ("/m/b".to_string(), 1),
            ]
        );
        let names: Vec<_> = model
            .leaves()
            .iter()
            .map(|id| model.full_name(*id).unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["/m/sub/a", "/m/b"]);
    }
}
