//! The pipeline executor: graph ownership, the two metadata
//! propagation passes, staleness, and execution of the stale subgraph.

use ndflow_core::clock::{PipelineClock, Stamp};
use ndflow_core::error::{DispatchError, StageError, UpdateError};
use ndflow_core::event::{EventHub, Observer, RunOutcome, StageEvent, StageEventKind};
use ndflow_core::id::{OutputRef, StageId, SubscriptionId};
use ndflow_core::region::Region;
use ndflow_dispatch::{ProgressReporter, ThreadedDispatcher};
use ndflow_image::{Image, ImageView, Tile};

use std::sync::Arc;

use crate::data_object::DataObject;
use crate::stage::{ExecContext, InfoContext, InputInfo, InputRequest, OutputInfoSlot,
    OutputRequest, RequestContext, Stage, Threading};

/// One graph node: the stage plus everything the executor tracks about
/// it between updates.
struct Node {
    stage: Box<dyn Stage>,
    /// Upstream producer per input slot; `None` until connected.
    inputs: Vec<Option<OutputRef>>,
    /// One data object per stage output.
    outputs: Vec<DataObject>,
    /// Event channel for this stage. Stages never share hubs.
    hub: EventHub,
    /// Stamp of the last parameter mutation through
    /// [`Pipeline::modify`] or [`Pipeline::touch`].
    param_modified: Stamp,
    /// Stamp drawn when this stage last finished executing.
    last_executed: Stamp,
}

/// What one `update` call actually did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UpdateReport {
    /// Number of stages that were stale and re-executed. Zero means
    /// the update was satisfied entirely from buffered results.
    pub stages_executed: usize,
    /// Total output elements written across all executed stages.
    pub elements_computed: u64,
}

/// A demand-driven processing graph.
///
/// Stages are added with [`Pipeline::add_stage`] and wired with
/// [`Pipeline::connect`]; nothing computes until [`Pipeline::update`]
/// names a target output. An update runs two metadata-only passes over
/// the upstream subgraph (output information flowing downstream,
/// requested regions flowing upstream), then executes only the stages
/// whose results are stale; everything else is served from the
/// buffers of previous updates.
pub struct Pipeline {
    nodes: Vec<Node>,
    clock: PipelineClock,
    dispatcher: ThreadedDispatcher,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.nodes.len())
            .field("workers", &self.dispatcher.workers())
            .finish()
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    /// Create a pipeline sized to the machine's available parallelism.
    pub fn new() -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        // workers >= 1, so the dispatcher constructor cannot fail.
        match Self::with_workers(workers.max(1)) {
            Ok(pipeline) => pipeline,
            Err(_) => unreachable!("worker count is non-zero"),
        }
    }

    /// Create a pipeline with an explicit worker count (>= 1).
    pub fn with_workers(workers: usize) -> Result<Self, DispatchError> {
        Ok(Self {
            nodes: Vec::new(),
            clock: PipelineClock::new(),
            dispatcher: ThreadedDispatcher::new(workers)?,
        })
    }

    /// Worker threads used for tiled execution.
    pub fn workers(&self) -> usize {
        self.dispatcher.workers()
    }

    /// Number of stages in the graph.
    pub fn num_stages(&self) -> usize {
        self.nodes.len()
    }

    /// Add a stage to the graph. Its inputs start unconnected; its
    /// outputs start never-produced. The new stage is immediately
    /// stale.
    pub fn add_stage(&mut self, stage: impl Stage) -> StageId {
        let id = StageId(self.nodes.len() as u32);
        let inputs = vec![None; stage.num_inputs()];
        let outputs = (0..stage.num_outputs()).map(|_| DataObject::new(0)).collect();
        self.nodes.push(Node {
            stage: Box::new(stage),
            inputs,
            outputs,
            hub: EventHub::new(),
            param_modified: self.clock.tick(),
            last_executed: Stamp::NEVER,
        });
        id
    }

    /// Wire producer output `from` into input slot `input` of stage
    /// `to`, replacing any previous connection on that slot.
    ///
    /// Rejects ids and slot indices outside the graph, and direct
    /// self-loops; longer cycles are caught by `update`.
    pub fn connect(&mut self, from: OutputRef, to: StageId, input: usize) -> Result<(), UpdateError> {
        let from_outputs = self
            .nodes
            .get(from.stage.0 as usize)
            .map(|n| n.outputs.len())
            .ok_or(UpdateError::UnknownStage { id: from.stage })?;
        if from.output >= from_outputs {
            return Err(UpdateError::UnknownStage { id: from.stage });
        }
        let node = self
            .nodes
            .get_mut(to.0 as usize)
            .ok_or(UpdateError::UnknownStage { id: to })?;
        if input >= node.inputs.len() {
            return Err(UpdateError::UnknownStage { id: to });
        }
        if from.stage == to {
            return Err(UpdateError::CycleDetected {
                stage: node.stage.name().to_string(),
            });
        }
        node.inputs[input] = Some(from);
        node.param_modified = self.clock.tick();
        Ok(())
    }

    /// Mutate a stage's parameters through its concrete type and mark
    /// it stale. Returns `false` if the id is unknown or the stage is
    /// not an `S`.
    pub fn modify<S: Stage>(&mut self, id: StageId, f: impl FnOnce(&mut S)) -> bool {
        let Some(node) = self.nodes.get_mut(id.0 as usize) else {
            return false;
        };
        let Some(stage) = node.stage.as_mut().as_any_mut().downcast_mut::<S>() else {
            return false;
        };
        f(stage);
        node.param_modified = self.clock.tick();
        true
    }

    /// Mark a stage stale without touching its parameters. Returns
    /// `false` if the id is unknown.
    pub fn touch(&mut self, id: StageId) -> bool {
        match self.nodes.get_mut(id.0 as usize) {
            Some(node) => {
                node.param_modified = self.clock.tick();
                true
            }
            None => false,
        }
    }

    /// Record a persistent explicit request for `target`: subsequent
    /// updates of that output compute only `region` instead of its
    /// full extent. Bounds are checked at update time, once extents
    /// are known.
    pub fn request_region(&mut self, target: OutputRef, region: Region) -> Result<(), UpdateError> {
        let obj = self
            .object_mut(target)
            .ok_or(UpdateError::UnknownStage { id: target.stage })?;
        obj.set_explicit_request(Some(region));
        Ok(())
    }

    /// Drop the persistent explicit request on `target`, restoring
    /// full-extent updates.
    pub fn clear_request(&mut self, target: OutputRef) -> Result<(), UpdateError> {
        let obj = self
            .object_mut(target)
            .ok_or(UpdateError::UnknownStage { id: target.stage })?;
        obj.set_explicit_request(None);
        Ok(())
    }

    /// Free `target`'s buffer, keeping its metadata. The next update
    /// that needs this output recomputes it. Returns `false` if the
    /// reference is unknown.
    pub fn release_output(&mut self, target: OutputRef) -> bool {
        match self.object_mut(target) {
            Some(obj) => {
                obj.release_buffer();
                true
            }
            None => false,
        }
    }

    /// The data object behind an output reference.
    pub fn data_object(&self, target: OutputRef) -> Option<&DataObject> {
        self.nodes
            .get(target.stage.0 as usize)
            .and_then(|n| n.outputs.get(target.output))
    }

    /// The materialized buffer behind an output reference, if any.
    pub fn output_image(&self, target: OutputRef) -> Option<&Image> {
        self.data_object(target).and_then(|obj| obj.buffer())
    }

    /// Subscribe an observer to one stage's events.
    pub fn subscribe(
        &self,
        stage: StageId,
        kind: StageEventKind,
        observer: Arc<dyn Observer>,
    ) -> Result<SubscriptionId, UpdateError> {
        let node = self
            .nodes
            .get(stage.0 as usize)
            .ok_or(UpdateError::UnknownStage { id: stage })?;
        Ok(node.hub.subscribe(kind, observer))
    }

    /// Remove a subscription from one stage's hub. Returns whether it
    /// existed.
    pub fn unsubscribe(&self, stage: StageId, subscription: SubscriptionId) -> bool {
        match self.nodes.get(stage.0 as usize) {
            Some(node) => node.hub.unsubscribe(subscription),
            None => false,
        }
    }

    fn object_mut(&mut self, target: OutputRef) -> Option<&mut DataObject> {
        self.nodes
            .get_mut(target.stage.0 as usize)
            .and_then(|n| n.outputs.get_mut(target.output))
    }

    // ── update ─────────────────────────────────────────────────────

    /// Bring `target` up to date.
    ///
    /// Runs, over the subgraph upstream of `target`:
    ///
    /// 1. information propagation, producers before consumers, so
    ///    every output's extent and metadata reflect current
    ///    parameters;
    /// 2. request propagation, consumers before producers, seeding the
    ///    target from its explicit request (or full extent) and letting
    ///    each stage translate output requests into input requests;
    /// 3. staleness-gated execution, producers before consumers: a
    ///    stage re-executes only if its parameters or any input changed
    ///    since it last ran, or a requested region is not buffered.
    ///
    /// Up-to-date stages are skipped entirely (no events, no
    /// computation). A failing stage aborts the update with its stamps
    /// and any previously installed buffers untouched, so the next
    /// update retries it; already-executed upstream results are kept.
    pub fn update(&mut self, target: OutputRef) -> Result<UpdateReport, UpdateError> {
        let t = target.stage.0 as usize;
        let valid = self
            .nodes
            .get(t)
            .is_some_and(|n| target.output < n.outputs.len());
        if !valid {
            return Err(UpdateError::UnknownStage { id: target.stage });
        }

        let order = self.topo_from(t)?;
        self.propagate_information(&order)?;

        // Requests are rebuilt from scratch every update so a shrinking
        // request is honored.
        for &i in &order {
            for obj in &mut self.nodes[i].outputs {
                obj.clear_request();
            }
        }
        self.seed_target_request(target)?;
        self.propagate_requests(&order)?;

        let mut report = UpdateReport::default();
        for &i in &order {
            if !self.is_stale(i) {
                continue;
            }
            let combined = combined_request(&self.nodes[i]);
            // On failure the node's installed buffers are untouched
            // (fresh results are computed aside and only installed on
            // success) and its stamps stay put, so the retry condition
            // that made it stale still holds next update.
            let images = execute_node(&self.nodes, &self.dispatcher, i, &combined)?;

            let num_outputs = images.len() as u64;
            let node = &mut self.nodes[i];
            for (obj, image) in node.outputs.iter_mut().zip(images) {
                obj.install_buffer(image, combined.clone());
                obj.mark_modified(&self.clock);
            }
            // Drawn after the outputs' stamps: a freshly executed
            // stage is never stale against its own results.
            node.last_executed = self.clock.tick();
            let _ = node.hub.notify(&StageEvent::End {
                stage: node.stage.name().to_string(),
                outcome: RunOutcome::Completed,
            });

            report.stages_executed += 1;
            report.elements_computed += combined.num_elements() * num_outputs;
        }
        Ok(report)
    }

    /// Topological order of the subgraph upstream of `root`, producers
    /// first. Fails on unconnected inputs and cycles.
    fn topo_from(&self, root: usize) -> Result<Vec<usize>, UpdateError> {
        fn visit(
            nodes: &[Node],
            i: usize,
            state: &mut [u8],
            order: &mut Vec<usize>,
        ) -> Result<(), UpdateError> {
            match state[i] {
                2 => return Ok(()),
                1 => {
                    return Err(UpdateError::CycleDetected {
                        stage: nodes[i].stage.name().to_string(),
                    })
                }
                _ => {}
            }
            state[i] = 1;
            for (k, input) in nodes[i].inputs.iter().enumerate() {
                let Some(r) = input else {
                    return Err(UpdateError::MissingInput {
                        stage: nodes[i].stage.name().to_string(),
                        input_index: k,
                    });
                };
                visit(nodes, r.stage.0 as usize, state, order)?;
            }
            state[i] = 2;
            order.push(i);
            Ok(())
        }

        let mut state = vec![0u8; self.nodes.len()];
        let mut order = Vec::new();
        visit(&self.nodes, root, &mut state, &mut order)?;
        Ok(order)
    }

    /// Pass 1: producers before consumers, each stage derives its
    /// outputs' extents and metadata from its inputs' (or, for
    /// sources, from its parameters). Stamps bump only on actual
    /// change.
    fn propagate_information(&mut self, order: &[usize]) -> Result<(), UpdateError> {
        for &i in order {
            let input_infos: Vec<InputInfo> = self.nodes[i]
                .inputs
                .iter()
                .flatten()
                .map(|r| {
                    let up = &self.nodes[r.stage.0 as usize].outputs[r.output];
                    InputInfo {
                        largest: up.largest_possible_region().clone(),
                        info: up.info().clone(),
                    }
                })
                .collect();
            let mut slots: Vec<OutputInfoSlot> = self.nodes[i]
                .outputs
                .iter()
                .map(|obj| OutputInfoSlot {
                    largest: obj.largest_possible_region().clone(),
                    info: obj.info().clone(),
                })
                .collect();

            let mut ctx = InfoContext::new(&input_infos, &mut slots);
            self.nodes[i]
                .stage
                .compute_output_information(&mut ctx)
                .map_err(|reason| UpdateError::ComputationFailure {
                    stage: self.nodes[i].stage.name().to_string(),
                    reason,
                })?;

            let node = &mut self.nodes[i];
            for (obj, slot) in node.outputs.iter_mut().zip(slots) {
                obj.set_largest_possible_region(slot.largest, &self.clock);
                obj.set_info(slot.info, &self.clock);
            }
        }
        Ok(())
    }

    /// Deposit the initial request on the update target: its explicit
    /// request if one was recorded, otherwise its full extent.
    fn seed_target_request(&mut self, target: OutputRef) -> Result<(), UpdateError> {
        let node = &mut self.nodes[target.stage.0 as usize];
        let obj = &mut node.outputs[target.output];
        let largest = obj.largest_possible_region().clone();
        let desired = obj.explicit_request().cloned().unwrap_or_else(|| largest.clone());
        if !largest.contains(&desired) {
            return Err(UpdateError::OutOfBoundsRequest {
                stage: node.stage.name().to_string(),
                requested: desired,
                largest,
            });
        }
        obj.request_region(&desired);
        Ok(())
    }

    /// Pass 2: consumers before producers. Each stage first gets a
    /// chance to enlarge its own outputs' requests (clamped to the
    /// extent), then translates them into requests on its inputs,
    /// which merge by union into the producers' data objects.
    fn propagate_requests(&mut self, order: &[usize]) -> Result<(), UpdateError> {
        for &i in order.iter().rev() {
            let mut output_requests = Vec::with_capacity(self.nodes[i].outputs.len());
            {
                let node = &mut self.nodes[i];
                for o in 0..node.outputs.len() {
                    let largest = node.outputs[o].largest_possible_region().clone();
                    let effective = node.outputs[o].effective_requested_region();
                    let enlarged = node
                        .stage
                        .enlarge_requested_region(o, &effective, &largest)
                        .crop_to(&largest);
                    node.outputs[o].set_requested_region(enlarged.clone());
                    output_requests.push(OutputRequest {
                        requested: enlarged,
                        largest,
                    });
                }
            }
            if self.nodes[i].inputs.is_empty() {
                continue;
            }

            let input_refs: Vec<OutputRef> =
                self.nodes[i].inputs.iter().flatten().copied().collect();
            let mut input_requests: Vec<InputRequest> = input_refs
                .iter()
                .map(|r| InputRequest {
                    largest: self.nodes[r.stage.0 as usize].outputs[r.output]
                        .largest_possible_region()
                        .clone(),
                    requested: None,
                })
                .collect();

            let mut ctx = RequestContext::new(&output_requests, &mut input_requests);
            self.nodes[i]
                .stage
                .compute_input_requested_regions(&mut ctx)
                .map_err(|reason| UpdateError::ComputationFailure {
                    stage: self.nodes[i].stage.name().to_string(),
                    reason,
                })?;

            let combined = union_of_requests(&output_requests);
            for (slot, r) in input_requests.iter().zip(&input_refs) {
                // Inputs left unset default to pass-through.
                let requested = match &slot.requested {
                    Some(region) => region.clone(),
                    None => combined.crop_to(&slot.largest),
                };
                if !slot.largest.contains(&requested) {
                    return Err(UpdateError::OutOfBoundsRequest {
                        stage: self.nodes[r.stage.0 as usize].stage.name().to_string(),
                        requested,
                        largest: slot.largest.clone(),
                    });
                }
                self.nodes[r.stage.0 as usize].outputs[r.output].request_region(&requested);
            }
        }
        Ok(())
    }

    /// A stage is stale when its parameters changed since it last ran,
    /// an input was produced since it last ran, or a requested region
    /// is not covered by what is buffered.
    fn is_stale(&self, i: usize) -> bool {
        let node = &self.nodes[i];
        if node.param_modified > node.last_executed {
            return true;
        }
        for r in node.inputs.iter().flatten() {
            if self.nodes[r.stage.0 as usize].outputs[r.output].modified() > node.last_executed {
                return true;
            }
        }
        node.outputs.iter().any(|obj| {
            obj.requested_region().is_some() && !obj.is_request_buffered()
        })
    }
}

/// Union of all of a node's outputs' requested regions. Outputs are
/// congruent: they are produced together over this one region.
fn combined_request(node: &Node) -> Region {
    let mut regions = node.outputs.iter().map(DataObject::effective_requested_region);
    match regions.next() {
        Some(first) => regions.fold(first, |a, b| a.bounding_union(&b)),
        None => Region::empty(0),
    }
}

fn union_of_requests(requests: &[OutputRequest]) -> Region {
    let mut regions = requests.iter().map(|r| r.requested.clone());
    match regions.next() {
        Some(first) => regions.fold(first, |a, b| a.bounding_union(&b)),
        None => Region::empty(0),
    }
}

/// Execute one stale node over `combined`, returning one freshly
/// computed buffer per output. Emits `Start` and `Progress`; the
/// caller installs the buffers, bumps stamps, and emits `End`.
fn execute_node(
    nodes: &[Node],
    dispatcher: &ThreadedDispatcher,
    i: usize,
    combined: &Region,
) -> Result<Vec<Image>, UpdateError> {
    let node = &nodes[i];
    let name = node.stage.name().to_string();
    let _ = node.hub.notify(&StageEvent::Start {
        stage: name.clone(),
    });

    let mut views: Vec<ImageView<'_>> = Vec::with_capacity(node.inputs.len());
    for (k, input) in node.inputs.iter().enumerate() {
        let Some(r) = input else {
            return Err(UpdateError::MissingInput {
                stage: name,
                input_index: k,
            });
        };
        let up = &nodes[r.stage.0 as usize].outputs[r.output];
        let Some(buffer) = up.buffer() else {
            // An up-to-date producer always has a buffer covering its
            // request; a released one re-executes first. Reaching this
            // means a producer failed to materialize its result.
            return Err(UpdateError::ComputationFailure {
                stage: name,
                reason: StageError::MissingInput { input_index: k },
            });
        };
        views.push(buffer.view());
    }

    let slots: Vec<OutputInfoSlot> = node
        .outputs
        .iter()
        .map(|obj| OutputInfoSlot {
            largest: obj.largest_possible_region().clone(),
            info: obj.info().clone(),
        })
        .collect();
    let ctx = ExecContext::new(node.stage.name(), views, &slots, &node.hub);
    let progress = ProgressReporter::new(&node.hub, node.stage.name(), combined.num_elements());

    let num_outputs = node.outputs.len();
    let mut images = Vec::with_capacity(num_outputs);
    for _ in 0..num_outputs {
        let image = Image::allocate(combined).map_err(|_| UpdateError::ResourceExhaustion {
            stage: name.clone(),
            elements: combined.num_elements(),
        })?;
        images.push(image);
    }

    let compute =
        |sub: &Region, tiles: &mut [Tile]| -> Result<(), StageError> { node.stage.execute(&ctx, sub, tiles) };

    match node.stage.threading() {
        Threading::Tiled => {
            let tile_sets = dispatcher
                .dispatch(combined, num_outputs, &compute, &progress)
                .map_err(|err| match err {
                    DispatchError::WorkerFailed {
                        reason: StageError::ResourceExhaustion { elements },
                    } => UpdateError::ResourceExhaustion {
                        stage: name.clone(),
                        elements,
                    },
                    DispatchError::WorkerFailed { reason } => UpdateError::ComputationFailure {
                        stage: name.clone(),
                        reason,
                    },
                    DispatchError::NoWorkers => UpdateError::ComputationFailure {
                        stage: name.clone(),
                        reason: StageError::ExecutionFailed {
                            reason: "dispatcher has no workers".into(),
                        },
                    },
                })?;
            for tiles in &tile_sets {
                for (image, tile) in images.iter_mut().zip(tiles) {
                    image.blit(tile);
                }
            }
        }
        Threading::Single => {
            // One invocation covering the whole region, on this
            // thread. Iterative and global stages rely on this.
            let mut tiles = Vec::with_capacity(num_outputs);
            for _ in 0..num_outputs {
                let tile = Tile::allocate(combined).map_err(|_| UpdateError::ResourceExhaustion {
                    stage: name.clone(),
                    elements: combined.num_elements(),
                })?;
                tiles.push(tile);
            }
            compute(combined, &mut tiles).map_err(|reason| UpdateError::ComputationFailure {
                stage: name.clone(),
                reason,
            })?;
            progress.completed(combined.num_elements());
            for (image, tile) in images.iter_mut().zip(&tiles) {
                image.blit(tile);
            }
        }
    }
    Ok(images)
}
