//! The encoder instance: a bounded frame-job queue feeding a worker pool,
//! and a collector that assembles GOFs, unifies their map height, drives
//! the 2-D encoder collaborator and emits V3C chunks in GOF order.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam::channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};

use crate::error::Error;
use crate::map_encoding::{encode_gof_maps, Map2dEncoderFactory};
use crate::packing::{PackingContext, PatchPacker, ShelfPacker};
use crate::parameters::Parameters;
use crate::stats::{log_gof_summary, FrameStats};
use crate::stream::{V3cChunk, V3cUnitStream};
use crate::{map_generation, patch_generation, preset, Frame, Gof};

enum Job {
    /// Patch generation and packing for a fresh frame.
    Patches {
        gof_id: usize,
        frame: Box<Frame>,
        output: Arc<V3cUnitStream>,
    },
    /// Map generation at the GOF-unified height.
    Maps {
        gof_id: usize,
        frame: Box<Frame>,
        stats: FrameStats,
    },
}

enum Event {
    PatchesDone {
        gof_id: usize,
        frame: Box<Frame>,
        output: Arc<V3cUnitStream>,
        stats: FrameStats,
    },
    MapsDone {
        gof_id: usize,
        frame: Box<Frame>,
        stats: FrameStats,
    },
    FrameFailed {
        gof_id: usize,
        output: Arc<V3cUnitStream>,
        error: Error,
    },
    /// No further frames will join this GOF.
    GofClosed { gof_id: usize, frame_count: usize },
    Shutdown,
}

#[derive(Default)]
struct ProgressState {
    resolved_gofs: usize,
    fatal: bool,
}

/// Collector progress shared with `emptyFrameQueue` waiters.
struct Progress {
    state: Mutex<ProgressState>,
    changed: Condvar,
}

impl Progress {
    fn new() -> Self {
        Self {
            state: Mutex::new(ProgressState::default()),
            changed: Condvar::new(),
        }
    }

    fn mark_resolved(&self) {
        let mut state = self.state.lock();
        state.resolved_gofs += 1;
        self.changed.notify_all();
    }

    fn mark_fatal(&self) {
        let mut state = self.state.lock();
        state.fatal = true;
        self.changed.notify_all();
    }

    fn wait_for(&self, gof_count: usize) {
        let mut state = self.state.lock();
        while state.resolved_gofs < gof_count && !state.fatal {
            self.changed.wait(&mut state);
        }
    }
}

/// Frame-to-GOF bookkeeping on the submission side.
#[derive(Default)]
struct SubmitState {
    current_gof: usize,
    frames_in_gof: usize,
}

/// Builds an [`Encoder`]: parameters first, then `initialize`. Parameters
/// are frozen at initialization; a running encoder exposes no way to
/// mutate them.
pub struct EncoderBuilder {
    params: Parameters,
    packer: Arc<dyn PatchPacker>,
    factory: Option<Arc<dyn Map2dEncoderFactory>>,
}

impl EncoderBuilder {
    pub fn new() -> Self {
        Self {
            params: Parameters::new(),
            packer: Arc::new(ShelfPacker),
            factory: None,
        }
    }

    /// Set one parameter from its string form.
    pub fn set_parameter(&mut self, name: &str, value: &str) -> Result<(), Error> {
        self.params.set(name, value)
    }

    /// Replace the default shelf packer with an external layout heuristic.
    pub fn patch_packer(mut self, packer: Arc<dyn PatchPacker>) -> Self {
        self.packer = packer;
        self
    }

    /// The 2-D encoder collaborator resolving encoder names to codecs.
    pub fn map_encoder_factory(mut self, factory: Arc<dyn Map2dEncoderFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Apply the preset, validate the configuration and start the worker
    /// pool. Every parameter is locked from here on.
    pub fn initialize(mut self) -> Result<Encoder, Error> {
        preset::apply_preset(&mut self.params)?;
        self.params.validate()?;
        let factory = self
            .factory
            .ok_or_else(|| Error::Precondition("no 2D map encoder factory was provided".into()))?;

        let params = Arc::new(self.params);
        let worker_count = params.max_concurrent_frames;
        let (job_tx, job_rx) = bounded::<Job>(worker_count);
        let (event_tx, event_rx) = unbounded::<Event>();
        let progress = Arc::new(Progress::new());

        let mut workers = Vec::with_capacity(worker_count);
        for worker_index in 0..worker_count {
            let job_rx = job_rx.clone();
            let event_tx = event_tx.clone();
            let params = params.clone();
            let packer = self.packer.clone();
            workers.push(
                std::thread::Builder::new()
                    .name(format!("vpcc-worker-{worker_index}"))
                    .spawn(move || worker_loop(&job_rx, &event_tx, &params, packer.as_ref()))
                    .expect("failed to spawn worker thread"),
            );
        }

        let collector = {
            let params = params.clone();
            let job_tx = job_tx.clone();
            let progress = progress.clone();
            std::thread::Builder::new()
                .name("vpcc-collector".into())
                .spawn(move || {
                    collector_loop(&event_rx, &job_tx, &params, factory.as_ref(), &progress)
                })
                .expect("failed to spawn collector thread")
        };

        log::info!(target: "API",
            "encoder initialized: {} workers, GOF size {}, map width {}",
            worker_count, params.size_gof, params.map_width);

        Ok(Encoder {
            params,
            job_tx: Some(job_tx),
            event_tx: Some(event_tx),
            workers,
            collector: Some(collector),
            progress,
            submit: Mutex::new(SubmitState::default()),
        })
    }
}

impl Default for EncoderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running encoder instance. Several instances may coexist; each owns
/// its parameter table and worker pool.
pub struct Encoder {
    params: Arc<Parameters>,
    job_tx: Option<Sender<Job>>,
    event_tx: Option<Sender<Event>>,
    workers: Vec<JoinHandle<()>>,
    collector: Option<JoinHandle<()>>,
    progress: Arc<Progress>,
    submit: Mutex<SubmitState>,
}

impl Encoder {
    pub fn builder() -> EncoderBuilder {
        EncoderBuilder::new()
    }

    /// The frozen configuration of this instance.
    pub fn parameters(&self) -> &Parameters {
        &self.params
    }

    /// Parameters are initialization-only; changing one on a running
    /// encoder is a configuration error.
    pub fn set_parameter(&self, name: &str, _value: &str) -> Result<(), Error> {
        Err(Error::ParameterLocked(name.into()))
    }

    /// Submit a frame. Blocks while the worker pool is saturated. The
    /// chunk for the frame's GOF is eventually pushed to `output`.
    pub fn encode_frame(&self, frame: Frame, output: &Arc<V3cUnitStream>) -> Result<(), Error> {
        if frame.points_geometry.len() != frame.points_attribute.len() {
            return Err(Error::Precondition(format!(
                "frame {}: geometry and attribute counts differ ({} vs {})",
                frame.frame_id,
                frame.points_geometry.len(),
                frame.points_attribute.len()
            )));
        }
        let job_tx = self.job_tx.as_ref().ok_or(Error::Stopped)?;
        let event_tx = self.event_tx.as_ref().ok_or(Error::Stopped)?;

        let gof_id = {
            let mut submit = self.submit.lock();
            let gof_id = submit.current_gof;
            submit.frames_in_gof += 1;
            if submit.frames_in_gof == self.params.size_gof {
                let _ = event_tx.send(Event::GofClosed {
                    gof_id,
                    frame_count: submit.frames_in_gof,
                });
                submit.current_gof += 1;
                submit.frames_in_gof = 0;
            }
            gof_id
        };

        job_tx
            .send(Job::Patches {
                gof_id,
                frame: Box::new(frame),
                output: output.clone(),
            })
            .map_err(|_| Error::Stopped)
    }

    /// Close the current partial GOF, if any. Returns the number of GOFs
    /// submitted so far.
    fn close_partial_gof(&self) -> usize {
        let mut submit = self.submit.lock();
        if submit.frames_in_gof > 0 {
            if let Some(event_tx) = self.event_tx.as_ref() {
                let _ = event_tx.send(Event::GofClosed {
                    gof_id: submit.current_gof,
                    frame_count: submit.frames_in_gof,
                });
            }
            submit.current_gof += 1;
            submit.frames_in_gof = 0;
        }
        submit.current_gof
    }

    /// Drain every pending frame and flush the last partial GOF; returns
    /// once every submitted GOF has been emitted.
    pub fn empty_frame_queue(&self) {
        let gof_count = self.close_partial_gof();
        self.progress.wait_for(gof_count);
    }

    /// Wait for in-flight frames, close the output with the sentinel
    /// chunk and join the workers.
    pub fn stop(mut self) -> Result<(), Error> {
        self.shutdown();
        if let Some(collector) = self.collector.take() {
            collector
                .join()
                .map_err(|_| Error::Internal("collector thread panicked".into()))?;
        }
        for worker in self.workers.drain(..) {
            worker
                .join()
                .map_err(|_| Error::Internal("worker thread panicked".into()))?;
        }
        log::info!(target: "API", "encoder stopped");
        Ok(())
    }

    fn shutdown(&mut self) {
        self.close_partial_gof();
        if let Some(event_tx) = self.event_tx.take() {
            let _ = event_tx.send(Event::Shutdown);
        }
        drop(self.job_tx.take());
    }
}

impl Drop for Encoder {
    fn drop(&mut self) {
        // A dropped (not stopped) encoder still shuts its threads down.
        self.shutdown();
        if let Some(collector) = self.collector.take() {
            let _ = collector.join();
        }
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn process_frame(
    frame: &mut Frame,
    params: &Parameters,
    packer: &dyn PatchPacker,
) -> Result<FrameStats, Error> {
    let start = Instant::now();
    let mut stats = FrameStats {
        frame_id: frame.frame_id,
        point_count: frame.points_geometry.len(),
        ..FrameStats::default()
    };

    stats.voxel_count = patch_generation::generate_frame_patches(frame, params);
    stats.patch_count = frame.patch_list.len();

    let r = params.occupancy_map_ds_resolution;
    let context = PackingContext {
        map_width_ds: params.map_width / r,
        minimum_map_height_ds: params.minimum_map_height / r,
        dynamic_map_height: params.dynamic_map_height,
    };
    let map_height_ds = packer.pack_frame(&mut frame.patch_list, &context)?;
    frame.map_height_ds = map_height_ds;
    frame.map_height = map_height_ds * r;

    stats.patch_generation_time = start.elapsed();
    Ok(stats)
}

fn worker_loop(
    job_rx: &Receiver<Job>,
    event_tx: &Sender<Event>,
    params: &Parameters,
    packer: &dyn PatchPacker,
) {
    while let Ok(job) = job_rx.recv() {
        match job {
            Job::Patches {
                gof_id,
                mut frame,
                output,
            } => match process_frame(&mut frame, params, packer) {
                Ok(stats) => {
                    let _ = event_tx.send(Event::PatchesDone {
                        gof_id,
                        frame,
                        output,
                        stats,
                    });
                }
                Err(error) => {
                    log::error!(target: "PATCH GENERATION",
                        "frame {} failed: {error}", frame.frame_id);
                    let _ = event_tx.send(Event::FrameFailed {
                        gof_id,
                        output,
                        error,
                    });
                }
            },
            Job::Maps {
                gof_id,
                mut frame,
                mut stats,
            } => {
                let start = Instant::now();
                map_generation::generate_frame_maps(&mut frame, params);
                stats.map_generation_time = start.elapsed();
                if params.export_statistics {
                    stats.log_summary();
                }
                let _ = event_tx.send(Event::MapsDone {
                    gof_id,
                    frame,
                    stats,
                });
            }
        }
    }
}

#[derive(Default)]
struct GofAssembly {
    frames: Vec<Box<Frame>>,
    output: Option<Arc<V3cUnitStream>>,
    arrived: usize,
    expected: Option<usize>,
    failed: Option<Error>,
    dispatched: bool,
    maps_pending: usize,
    gof_shell: Option<Gof>,
    stats: Vec<FrameStats>,
}

struct Collector<'a> {
    params: &'a Parameters,
    job_tx: &'a Sender<Job>,
    factory: &'a dyn Map2dEncoderFactory,
    progress: &'a Progress,

    assemblies: BTreeMap<usize, GofAssembly>,
    ready: BTreeMap<usize, (Arc<V3cUnitStream>, V3cChunk)>,
    next_emit: usize,
    resolved: usize,
    closed_gofs: usize,
    shutdown: bool,
    fatal: bool,
    seen_streams: Vec<Arc<V3cUnitStream>>,
}

impl<'a> Collector<'a> {
    fn remember_stream(&mut self, stream: &Arc<V3cUnitStream>) {
        if !self
            .seen_streams
            .iter()
            .any(|known| Arc::ptr_eq(known, stream))
        {
            self.seen_streams.push(stream.clone());
        }
    }

    /// Dispatch map generation once every member frame's patches exist
    /// and the GOF membership is final.
    fn try_dispatch(&mut self, gof_id: usize) {
        let (frames, stats) = {
            let Some(assembly) = self.assemblies.get_mut(&gof_id) else {
                return;
            };
            let Some(expected) = assembly.expected else {
                return;
            };
            if assembly.dispatched || assembly.arrived < expected {
                return;
            }
            assembly.dispatched = true;
            if assembly.failed.is_some() {
                // Error chunk instead of maps; handled below without the
                // borrow held.
                (Vec::new(), Vec::new())
            } else {
                (
                    std::mem::take(&mut assembly.frames),
                    std::mem::take(&mut assembly.stats),
                )
            }
        };

        if self.assemblies[&gof_id].failed.is_some() {
            self.resolve_failed(gof_id);
            return;
        }

        let mut frames: Vec<Frame> = frames.into_iter().map(|boxed| *boxed).collect();
        frames.sort_by_key(|frame| frame.frame_id);
        let mut stats = stats;
        stats.sort_by_key(|entry| entry.frame_id);

        let mut gof = Gof {
            gof_id,
            frames,
            ..Gof::default()
        };
        map_generation::init_gof_map_generation(&mut gof, self.params);
        let frames_to_map = std::mem::take(&mut gof.frames);

        {
            let assembly = self.assemblies.get_mut(&gof_id).expect("known GOF");
            assembly.maps_pending = frames_to_map.len();
            assembly.gof_shell = Some(gof);
        }

        for (frame, frame_stats) in frames_to_map.into_iter().zip(stats) {
            let _ = self.job_tx.send(Job::Maps {
                gof_id,
                frame: Box::new(frame),
                stats: frame_stats,
            });
        }
    }

    /// All maps of a GOF are done: run the three 2-D encoders and queue
    /// the chunk.
    fn finish_gof(&mut self, gof_id: usize) {
        let (mut gof, output, stats) = {
            let assembly = self.assemblies.get_mut(&gof_id).expect("known GOF");
            let mut gof = assembly.gof_shell.take().expect("dispatched GOF");
            let mut frames = std::mem::take(&mut assembly.frames);
            frames.sort_by_key(|frame| frame.frame_id);
            gof.frames = frames.into_iter().map(|frame| *frame).collect();
            let output = assembly.output.clone().expect("GOF has an output stream");
            (gof, output, std::mem::take(&mut assembly.stats))
        };

        match encode_gof_maps(&mut gof, self.params, self.factory) {
            Ok(()) => {
                let sizes = vec![
                    gof.bitstream_occupancy.len(),
                    gof.bitstream_geometry.len(),
                    gof.bitstream_attribute.len(),
                ];
                let mut data = Vec::with_capacity(sizes.iter().sum());
                data.extend_from_slice(&gof.bitstream_occupancy);
                data.extend_from_slice(&gof.bitstream_geometry);
                data.extend_from_slice(&gof.bitstream_attribute);
                log_gof_summary(gof_id, &stats);
                self.ready.insert(
                    gof_id,
                    (
                        output,
                        V3cChunk {
                            data,
                            v3c_unit_sizes: sizes,
                            error: false,
                        },
                    ),
                );
                self.mark_resolved(gof_id);
            }
            Err(error) => {
                log::error!(target: "MAP ENCODING", "GOF {gof_id} failed: {error}");
                self.ready.insert(
                    gof_id,
                    (
                        output,
                        V3cChunk {
                            data: Vec::new(),
                            v3c_unit_sizes: Vec::new(),
                            error: true,
                        },
                    ),
                );
                self.mark_resolved(gof_id);
            }
        }
    }

    /// Emit an error chunk for a GOF whose frame work failed.
    fn resolve_failed(&mut self, gof_id: usize) {
        let assembly = self.assemblies.get(&gof_id).expect("known GOF");
        let output = assembly.output.clone().expect("GOF has an output stream");
        self.ready.insert(
            gof_id,
            (
                output,
                V3cChunk {
                    data: Vec::new(),
                    v3c_unit_sizes: Vec::new(),
                    error: true,
                },
            ),
        );
        self.mark_resolved(gof_id);
    }

    fn mark_resolved(&mut self, gof_id: usize) {
        self.assemblies.remove(&gof_id);
        self.resolved += 1;
        self.emit_ready();
        self.progress.mark_resolved();
    }

    /// Push every chunk whose turn has come, preserving GOF order.
    fn emit_ready(&mut self) {
        while let Some((output, chunk)) = self.ready.remove(&self.next_emit) {
            self.next_emit += 1;
            if self.fatal {
                continue;
            }
            let is_error = chunk.error;
            output.push(chunk);
            if is_error && self.params.errors_are_fatal {
                // Terminate after the current GOF: later chunks are
                // dropped and the stream is closed right away.
                output.push(V3cChunk::default());
                self.fatal = true;
                self.progress.mark_fatal();
            }
        }
    }

    fn done(&self) -> bool {
        self.shutdown && self.resolved >= self.closed_gofs
    }

    fn finish(&mut self) {
        if self.fatal {
            return;
        }
        for stream in &self.seen_streams {
            stream.push(V3cChunk::default());
        }
    }
}

fn collector_loop(
    event_rx: &Receiver<Event>,
    job_tx: &Sender<Job>,
    params: &Parameters,
    factory: &dyn Map2dEncoderFactory,
    progress: &Progress,
) {
    let mut collector = Collector {
        params,
        job_tx,
        factory,
        progress,
        assemblies: BTreeMap::new(),
        ready: BTreeMap::new(),
        next_emit: 0,
        resolved: 0,
        closed_gofs: 0,
        shutdown: false,
        fatal: false,
        seen_streams: Vec::new(),
    };

    while let Ok(event) = event_rx.recv() {
        match event {
            Event::PatchesDone {
                gof_id,
                frame,
                output,
                stats,
            } => {
                collector.remember_stream(&output);
                let assembly = collector.assemblies.entry(gof_id).or_default();
                assembly.output.get_or_insert(output);
                assembly.arrived += 1;
                assembly.frames.push(frame);
                assembly.stats.push(stats);
                collector.try_dispatch(gof_id);
            }
            Event::MapsDone {
                gof_id,
                frame,
                stats,
            } => {
                let assembly = collector
                    .assemblies
                    .get_mut(&gof_id)
                    .expect("maps for an unknown GOF");
                assembly.frames.push(frame);
                assembly.stats.push(stats);
                assembly.maps_pending -= 1;
                if assembly.maps_pending == 0 {
                    collector.finish_gof(gof_id);
                }
            }
            Event::FrameFailed {
                gof_id,
                output,
                error,
            } => {
                collector.remember_stream(&output);
                let assembly = collector.assemblies.entry(gof_id).or_default();
                assembly.output.get_or_insert(output);
                assembly.arrived += 1;
                assembly.failed.get_or_insert(error);
                collector.try_dispatch(gof_id);
            }
            Event::GofClosed {
                gof_id,
                frame_count,
            } => {
                collector.closed_gofs += 1;
                let assembly = collector.assemblies.entry(gof_id).or_default();
                assembly.expected = Some(frame_count);
                collector.try_dispatch(gof_id);
            }
            Event::Shutdown => {
                collector.shutdown = true;
            }
        }

        if collector.done() {
            break;
        }
    }

    collector.finish();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map_encoding::{Encoder2dConfig, Map2dEncoder, MapKind};
    use nalgebra::Vector3;

    /// A stand-in codec: "encodes" a GOF as one byte per input frame.
    struct StubEncoder {
        fail: bool,
    }

    impl Map2dEncoder for StubEncoder {
        fn configure(&mut self, _config: &Encoder2dConfig) -> Result<(), Error> {
            Ok(())
        }

        fn encode_gof(&mut self, frames: &[&[u8]]) -> Result<Vec<u8>, Error> {
            if self.fail {
                return Err(Error::MapEncoding("stub failure".into()));
            }
            Ok(vec![0xAB; frames.len()])
        }
    }

    struct StubFactory {
        fail: bool,
    }

    impl Map2dEncoderFactory for StubFactory {
        fn create(&self, _name: &str, _kind: MapKind) -> Result<Box<dyn Map2dEncoder>, Error> {
            Ok(Box::new(StubEncoder { fail: self.fail }))
        }
    }

    fn plane_frame(frame_id: usize) -> Frame {
        let mut geometry = Vec::new();
        for x in 0..8u16 {
            for y in 0..8u16 {
                geometry.push(Vector3::new(x, y, 5));
            }
        }
        let count = geometry.len();
        Frame::new(frame_id, frame_id, "test", geometry, vec![[200, 40, 10]; count])
    }

    fn test_builder(fail: bool) -> EncoderBuilder {
        let mut builder = Encoder::builder().map_encoder_factory(Arc::new(StubFactory { fail }));
        for (key, value) in [
            ("geoBitDepthInput", "5"),
            ("geoBitDepthVoxelized", "5"),
            ("geoBitDepthRefineSegmentation", "4"),
            ("sizeGOF", "8"),
            ("maxConcurrentFrames", "2"),
            ("minPointCountPerCC", "5"),
            ("maxNNCountPatchSegmentation", "32"),
            ("minLevel", "8"),
            ("mapWidth", "64"),
            ("minimumMapHeight", "16"),
            ("occupancyMapDSResolution", "2"),
        ] {
            builder.set_parameter(key, value).unwrap();
        }
        builder
    }

    #[test]
    fn three_frames_one_gof_then_sentinel() {
        let encoder = test_builder(false).initialize().unwrap();
        let output = Arc::new(V3cUnitStream::new());

        for frame_id in 0..3 {
            encoder.encode_frame(plane_frame(frame_id), &output).unwrap();
        }
        encoder.stop().unwrap();

        let chunk = output.pop();
        assert!(!chunk.error);
        assert_eq!(chunk.v3c_unit_sizes.len(), 3);
        // Occupancy carries 3 maps; geometry and attribute carry 6 each
        // with the default double layer.
        assert_eq!(chunk.v3c_unit_sizes, vec![3, 6, 6]);
        assert_eq!(chunk.len(), 15);

        let sentinel = output.pop();
        assert!(sentinel.is_sentinel());
    }

    #[test]
    fn gof_boundaries_follow_size_gof() {
        let encoder = test_builder(false).initialize().unwrap();
        let output = Arc::new(V3cUnitStream::new());

        // 10 frames at sizeGOF 8: one full GOF and one partial.
        for frame_id in 0..10 {
            encoder.encode_frame(plane_frame(frame_id), &output).unwrap();
        }
        encoder.empty_frame_queue();
        let chunks = output.try_drain();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].v3c_unit_sizes[0], 8);
        assert_eq!(chunks[1].v3c_unit_sizes[0], 2);

        encoder.stop().unwrap();
        assert!(output.pop().is_sentinel());
    }

    #[test]
    fn encoding_failure_emits_error_chunk() {
        let encoder = test_builder(true).initialize().unwrap();
        let output = Arc::new(V3cUnitStream::new());
        encoder.encode_frame(plane_frame(0), &output).unwrap();
        encoder.stop().unwrap();

        // errorsAreFatal defaults to true: error chunk, then the stream
        // closes.
        let chunk = output.pop();
        assert!(chunk.error);
        assert!(chunk.is_empty());
        assert!(output.pop().is_sentinel());
    }

    #[test]
    fn non_fatal_errors_skip_the_gof() {
        let mut builder = test_builder(true);
        builder.set_parameter("errorsAreFatal", "false").unwrap();
        let encoder = builder.initialize().unwrap();
        let output = Arc::new(V3cUnitStream::new());
        encoder.encode_frame(plane_frame(0), &output).unwrap();
        encoder.stop().unwrap();

        let chunk = output.pop();
        assert!(chunk.error);
        // The encoder carried on and closed the stream normally.
        assert!(output.pop().is_sentinel());
    }

    #[test]
    fn parameters_are_locked_after_initialization() {
        let encoder = test_builder(false).initialize().unwrap();
        assert!(matches!(
            encoder.set_parameter("sizeGOF", "16"),
            Err(Error::ParameterLocked(_))
        ));
        encoder.stop().unwrap();
    }

    #[test]
    fn mismatched_attribute_count_is_rejected() {
        let encoder = test_builder(false).initialize().unwrap();
        let output = Arc::new(V3cUnitStream::new());
        let mut frame = plane_frame(0);
        frame.points_attribute.pop();
        assert!(matches!(
            encoder.encode_frame(frame, &output),
            Err(Error::Precondition(_))
        ));
        encoder.stop().unwrap();
    }
}
