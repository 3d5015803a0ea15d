//! Dirty tracking, worker-pool dispatch, cancellation, and result finalization.
//!
//! The main thread marks chunks dirty, and once per [`tick`](MeshScheduler::tick)
//! finalizes a bounded number of finished jobs and then submits a bounded
//! number of new ones. Each job owns a [`ChunkSnapshot`] taken at submit time,
//! so workers never read live world data.
//!
//! At most one job per chunk is in flight. Re-marking a running chunk dirty
//! cancels its job, and the chunk is resubmitted once that job has reported
//! back. Removing a chunk cancels its job outright. Workers poll the flag
//! between voxel-type passes; the main thread drops any result whose job is
//! cancelled or no longer tracked, so it can never reach the renderer.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use lattice_config::MeshingConfig;
use lattice_voxel::{ChunkCoord, ChunkShape, ChunkSource, VoxelTypeRegistry, WorldEvent};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::buffers::{ChunkMeshRecord, PlaneBuffer, QuadBufferSink};
use crate::error::SubsystemError;
use crate::face::FaceDirection;
use crate::greedy::{ChunkQuads, greedy_mesh_cancellable};
use crate::quad::{MAX_QUAD_EXTENT, VERTICES_PER_QUAD};
use crate::snapshot::ChunkSnapshot;

/// Where a chunk coordinate is in the meshing lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MeshState {
    /// Nothing pending.
    Idle,
    /// Waiting to be submitted.
    Dirty,
    /// A job is queued or running and its result has not been finalized.
    InFlight,
}

/// Counters for one [`MeshScheduler::tick`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickStats {
    /// Jobs handed to the worker pool.
    pub submitted: usize,
    /// Results applied to the renderer.
    pub applied: usize,
    /// Results dropped because the chunk was dirtied again mid-run.
    pub discarded_stale: usize,
    /// Results dropped because their job was cancelled or superseded.
    pub discarded_cancelled: usize,
}

struct MeshTask {
    id: u64,
    snapshot: ChunkSnapshot,
    registry: Arc<VoxelTypeRegistry>,
    cancel: Arc<AtomicBool>,
}

struct MeshResult {
    id: u64,
    coord: ChunkCoord,
    /// `None` if the worker observed cancellation.
    quads: Option<ChunkQuads>,
}

struct ActiveJob {
    id: u64,
    cancel: Arc<AtomicBool>,
}

impl ActiveJob {
    fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }
}

/// Schedules chunk re-meshing on a fixed pool of worker threads.
pub struct MeshScheduler {
    task_sender: Option<Sender<MeshTask>>,
    result_receiver: Receiver<MeshResult>,
    worker_handles: Vec<JoinHandle<()>>,
    /// Tasks queued or running on workers, cancelled ones included.
    worker_backlog: Arc<AtomicUsize>,

    /// Submission order. May hold coordinates no longer in `dirty_set`.
    dirty_queue: VecDeque<ChunkCoord>,
    dirty_set: FxHashSet<ChunkCoord>,
    active: FxHashMap<ChunkCoord, ActiveJob>,
    records: FxHashMap<ChunkCoord, ChunkMeshRecord>,
    next_job_id: u64,

    max_jobs_per_tick: usize,
    max_results_per_tick: usize,
}

impl MeshScheduler {
    /// Spawns the worker pool described by `config`.
    pub fn new(config: &MeshingConfig) -> Result<Self, SubsystemError> {
        let worker_count = config.effective_workers(num_cpus::get());
        let (task_tx, task_rx) = crossbeam_channel::bounded::<MeshTask>(config.queue_capacity.max(1));
        let (result_tx, result_rx) = crossbeam_channel::unbounded::<MeshResult>();
        let worker_backlog = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::with_capacity(worker_count);
        for i in 0..worker_count {
            let rx = task_rx.clone();
            let tx = result_tx.clone();
            let backlog = Arc::clone(&worker_backlog);

            let handle = std::thread::Builder::new()
                .name(format!("mesh-worker-{i}"))
                .spawn(move || {
                    while let Ok(task) = rx.recv() {
                        let quads = run_task(&task);
                        let sent = tx.send(MeshResult {
                            id: task.id,
                            coord: task.snapshot.coord(),
                            quads,
                        });
                        backlog.fetch_sub(1, Ordering::Relaxed);
                        if sent.is_err() {
                            break;
                        }
                    }
                    tracing::debug!("mesh worker exiting");
                })?;
            handles.push(handle);
        }
        tracing::debug!(
            "Spawned {worker_count} mesh worker(s), queue capacity {}",
            config.queue_capacity
        );

        Ok(Self {
            task_sender: Some(task_tx),
            result_receiver: result_rx,
            worker_handles: handles,
            worker_backlog,
            dirty_queue: VecDeque::new(),
            dirty_set: FxHashSet::default(),
            active: FxHashMap::default(),
            records: FxHashMap::default(),
            next_job_id: 0,
            max_jobs_per_tick: config.max_jobs_per_tick.max(1),
            max_results_per_tick: config.max_results_per_tick.max(1),
        })
    }

    // -- dirty marking ------------------------------------------------------

    /// Queues `coord` for re-meshing. Marking an already dirty chunk is a no-op.
    ///
    /// A job already running for `coord` is cancelled; its chunk is
    /// resubmitted after the job reports back.
    pub fn mark_dirty(&mut self, coord: ChunkCoord) {
        if self.dirty_set.insert(coord) {
            self.dirty_queue.push_back(coord);
            if let Some(job) = self.active.get(&coord) {
                job.cancel();
            }
        }
    }

    /// A new chunk changes its own geometry and its neighbors' boundaries.
    pub fn chunk_created(&mut self, coord: ChunkCoord) {
        self.mark_dirty(coord);
        for neighbor in coord.face_neighbors() {
            self.mark_dirty(neighbor);
        }
    }

    /// Cancels any job for `coord`, frees its buffers, and re-meshes the
    /// neighbors whose boundary faces are now exposed.
    pub fn chunk_removed<S: QuadBufferSink + ?Sized>(&mut self, coord: ChunkCoord, sink: &mut S) {
        if let Some(job) = self.active.remove(&coord) {
            job.cancel();
            tracing::debug!("Cancelled mesh job {} for removed chunk {coord:?}", job.id);
        }
        self.dirty_set.remove(&coord);
        if let Some(mut record) = self.records.remove(&coord) {
            for buffer in record.take_all() {
                sink.release(buffer.handle);
            }
        }
        for neighbor in coord.face_neighbors() {
            self.mark_dirty(neighbor);
        }
    }

    /// A voxel at linear `index` changed. Neighbors are marked only when the
    /// cell lies on the boundary layer facing them.
    pub fn voxel_changed(&mut self, coord: ChunkCoord, index: usize, shape: ChunkShape) {
        self.mark_dirty(coord);
        let Some(local) = shape.coords(index) else {
            return;
        };
        let last = shape.side() - 1;
        for dir in FaceDirection::ALL {
            let (axis, _, _) = dir.sweep_axes();
            let edge = if dir.sign() > 0 { last } else { 0 };
            if local[axis] == edge {
                self.mark_dirty(dir.neighbor(coord));
            }
        }
    }

    /// Routes a world event to the matching trigger.
    pub fn handle_event<S: QuadBufferSink + ?Sized>(
        &mut self,
        event: WorldEvent,
        shape: ChunkShape,
        sink: &mut S,
    ) {
        match event {
            WorldEvent::ChunkCreated(coord) | WorldEvent::ChunkFilled(coord) => {
                self.chunk_created(coord);
            }
            WorldEvent::ChunkRemoved(coord) => self.chunk_removed(coord, sink),
            WorldEvent::VoxelChanged { coord, index } => self.voxel_changed(coord, index, shape),
        }
    }

    // -- per-tick work -------------------------------------------------------

    /// Finalizes up to `max_results_per_tick` finished jobs, then submits up
    /// to `max_jobs_per_tick` dirty chunks. Never blocks.
    pub fn tick<C, S>(
        &mut self,
        source: &C,
        registry: &Arc<VoxelTypeRegistry>,
        sink: &mut S,
    ) -> TickStats
    where
        C: ChunkSource + ?Sized,
        S: QuadBufferSink + ?Sized,
    {
        let mut stats = TickStats::default();
        self.finalize(source, sink, &mut stats);
        self.submit(source, registry, &mut stats);
        if stats != TickStats::default() {
            tracing::trace!("mesh tick: {stats:?}");
        }
        stats
    }

    fn finalize<C, S>(&mut self, source: &C, sink: &mut S, stats: &mut TickStats)
    where
        C: ChunkSource + ?Sized,
        S: QuadBufferSink + ?Sized,
    {
        for _ in 0..self.max_results_per_tick {
            let Ok(result) = self.result_receiver.try_recv() else {
                break;
            };
            let current = self.active.get(&result.coord).is_some_and(|j| j.id == result.id);
            if !current {
                tracing::trace!("Dropping untracked mesh job {}", result.id);
                stats.discarded_cancelled += 1;
                continue;
            }
            self.active.remove(&result.coord);

            let Some(quads) = result.quads else {
                stats.discarded_cancelled += 1;
                continue;
            };
            if self.dirty_set.contains(&result.coord) {
                tracing::debug!("Discarding stale mesh for {:?}", result.coord);
                stats.discarded_stale += 1;
                continue;
            }
            if source.find_chunk(result.coord).is_none() {
                stats.discarded_cancelled += 1;
                continue;
            }
            self.apply(result.coord, &quads, sink);
            stats.applied += 1;
        }
    }

    fn apply<S: QuadBufferSink + ?Sized>(&mut self, coord: ChunkCoord, quads: &ChunkQuads, sink: &mut S) {
        let record = self.records.entry(coord).or_default();
        let slots = record.plane_slots().max(quads.plane_slots());
        for plane in 0..slots as u16 {
            let list = quads.plane(plane);
            if list.is_empty() {
                if let Some(old) = record.replace(plane, None) {
                    sink.release(old.handle);
                }
                continue;
            }
            let previous = record.plane(plane).map(|b| b.handle);
            let handle = sink.upload(coord, plane, bytemuck::cast_slice(list), previous);
            record.replace(
                plane,
                Some(PlaneBuffer {
                    handle,
                    vertex_count: list.len() as u32 * VERTICES_PER_QUAD,
                }),
            );
        }
        if record.is_empty() {
            self.records.remove(&coord);
        }
        tracing::trace!("Applied {} quads to {coord:?}", quads.quad_count());
    }

    fn submit<C>(&mut self, source: &C, registry: &Arc<VoxelTypeRegistry>, stats: &mut TickStats)
    where
        C: ChunkSource + ?Sized,
    {
        let Some(sender) = self.task_sender.as_ref() else {
            return;
        };

        let side = source.chunk_shape().side();
        if side == 0 || side > MAX_QUAD_EXTENT as usize {
            if !self.dirty_set.is_empty() {
                tracing::warn!(
                    "Chunk side {side} is outside 1..={MAX_QUAD_EXTENT}; dropping {} dirty chunk(s)",
                    self.dirty_set.len()
                );
                self.dirty_set.clear();
                self.dirty_queue.clear();
            }
            return;
        }

        // Chunks whose previous job has not reported back yet.
        let mut deferred = Vec::new();
        while stats.submitted < self.max_jobs_per_tick {
            let Some(coord) = self.dirty_queue.pop_front() else {
                break;
            };
            if !self.dirty_set.contains(&coord) {
                continue;
            }
            if source.find_chunk(coord).is_none() {
                self.dirty_set.remove(&coord);
                continue;
            }
            if self.active.contains_key(&coord) {
                deferred.push(coord);
                continue;
            }

            let id = self.next_job_id;
            let cancel = Arc::new(AtomicBool::new(false));
            let task = MeshTask {
                id,
                snapshot: ChunkSnapshot::capture(source, coord),
                registry: Arc::clone(registry),
                cancel: Arc::clone(&cancel),
            };
            self.worker_backlog.fetch_add(1, Ordering::Relaxed);
            match sender.try_send(task) {
                Ok(()) => {}
                Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => {
                    self.worker_backlog.fetch_sub(1, Ordering::Relaxed);
                    self.dirty_queue.push_front(coord);
                    break;
                }
            }

            self.next_job_id += 1;
            self.dirty_set.remove(&coord);
            self.active.insert(coord, ActiveJob { id, cancel });
            tracing::trace!("Submitted mesh job {id} for {coord:?}");
            stats.submitted += 1;
        }
        for coord in deferred.into_iter().rev() {
            self.dirty_queue.push_front(coord);
        }
    }

    // -- queries --------------------------------------------------------------

    /// Lifecycle state of `coord`.
    pub fn state(&self, coord: ChunkCoord) -> MeshState {
        if self.dirty_set.contains(&coord) {
            MeshState::Dirty
        } else if self.active.contains_key(&coord) {
            MeshState::InFlight
        } else {
            MeshState::Idle
        }
    }

    /// Current geometry of `coord`. `None` if it has none.
    pub fn mesh_record(&self, coord: ChunkCoord) -> Option<&ChunkMeshRecord> {
        self.records.get(&coord)
    }

    /// Iterates over every chunk with geometry.
    pub fn mesh_records(&self) -> impl Iterator<Item = (ChunkCoord, &ChunkMeshRecord)> {
        self.records.iter().map(|(c, r)| (*c, r))
    }

    /// Jobs whose results have not been finalized. Jobs dropped by chunk
    /// removal are not counted.
    pub fn in_flight_count(&self) -> usize {
        self.active.len()
    }

    /// Chunks waiting to be submitted.
    pub fn dirty_count(&self) -> usize {
        self.dirty_set.len()
    }

    /// Tasks still queued or running on workers, cancelled ones included.
    pub fn worker_backlog(&self) -> usize {
        self.worker_backlog.load(Ordering::Relaxed)
    }

    /// Returns `true` when nothing is dirty or in flight.
    pub fn is_idle(&self) -> bool {
        self.dirty_set.is_empty() && self.active.is_empty()
    }

    /// Number of worker threads.
    pub fn worker_count(&self) -> usize {
        self.worker_handles.len()
    }

    /// Cancels outstanding jobs, closes the task queue, and joins the workers.
    pub fn shutdown(&mut self) {
        for job in self.active.values() {
            job.cancel();
        }
        self.active.clear();
        if self.task_sender.take().is_none() {
            return;
        }
        for handle in self.worker_handles.drain(..) {
            let _ = handle.join();
        }
        tracing::debug!("Mesh scheduler shut down");
    }
}

impl Drop for MeshScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_task(task: &MeshTask) -> Option<ChunkQuads> {
    if task.cancel.load(Ordering::Relaxed) {
        return None;
    }
    greedy_mesh_cancellable(&task.snapshot, &task.registry, || {
        task.cancel.load(Ordering::Relaxed)
    })
}
