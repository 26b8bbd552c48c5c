//! The per-model pipeline: decode, suppress, map, reconstruct, assemble.
//!
//! A [`Predictor`] is configured once per model. Shape problems surface from
//! [`Predictor::new`]; after that, each call to [`Predictor::predict`] only
//! fails on broken caller contracts (wrong buffer length, mismatched frame
//! context). Working buffers live in the predictor and are reused, so
//! steady-state calls allocate only what the returned result owns.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::{PredictorConfig, Thresholds};
use crate::decode::{CandidateArena, TensorDecoder};
use crate::error::YoloError;
use crate::labels::Labels;
use crate::mask::{Mask, MaskReconstructor};
use crate::nms::{NmsParams, NonMaxSuppressor, Overlap};
use crate::result::{
    ClassScore, Classification, Detection, DetectionResult, FrameMetadata, Keypoint, ObbInstance,
    PoseInstance, SegmentInstance, TaskResult,
};
use crate::tensor::{RawTensorOutput, Task, TensorSpec, COCO_KEYPOINT_NAMES};
use crate::transform::{CoordinateMapper, FrameContext};

/// Frames-per-second over one-second windows.
#[derive(Debug, Clone, Default)]
pub struct FpsMeter {
    window_start: Option<Instant>,
    frames: u32,
    fps: Option<f64>,
}

impl FpsMeter {
    pub const WINDOW: Duration = Duration::from_millis(1000);

    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one frame at `now`. The reported value only changes when a
    /// window closes.
    pub fn tick(&mut self, now: Instant) -> Option<f64> {
        let start = *self.window_start.get_or_insert(now);
        self.frames += 1;
        let elapsed = now.saturating_duration_since(start);
        if elapsed >= Self::WINDOW {
            let ms = elapsed.as_secs_f64() * 1000.0;
            self.fps = Some(f64::from(self.frames) / ms * 1000.0);
            self.window_start = Some(now);
            self.frames = 0;
        }
        self.fps
    }

    pub fn fps(&self) -> Option<f64> {
        self.fps
    }
}

pub struct Predictor {
    config: PredictorConfig,
    output_shape: Vec<usize>,
    decoder: TensorDecoder,
    labels: Option<Labels>,
    thresholds: Thresholds,
    arena: CandidateArena,
    nms: NonMaxSuppressor,
    masks: MaskReconstructor,
    ranked: Vec<(usize, f32)>,
    fps: FpsMeter,
}

impl Predictor {
    /// Validates `config` and the declared output shapes. `proto_shape` is
    /// required for segmentation and ignored otherwise.
    pub fn new(
        config: PredictorConfig,
        output_shape: &[usize],
        proto_shape: Option<&[usize]>,
    ) -> Result<Self, YoloError> {
        config.validate()?;
        let spec = TensorSpec::resolve(config.task, config.num_classes, output_shape, proto_shape)?;
        debug!(
            task = %config.task,
            classes = spec.num_classes,
            input_width = config.model_input_width,
            input_height = config.model_input_height,
            box_units = ?config.box_units,
            confidence = config.confidence_threshold,
            iou = config.iou_threshold,
            max_outputs = config.max_outputs,
            "predictor configured"
        );
        Ok(Self {
            decoder: TensorDecoder::new(
                spec,
                config.box_units,
                config.model_input_width,
                config.model_input_height,
            ),
            output_shape: output_shape.to_vec(),
            labels: None,
            thresholds: config.thresholds(),
            arena: CandidateArena::new(),
            nms: NonMaxSuppressor::new(),
            masks: MaskReconstructor::new(config.mask_mode),
            ranked: Vec::new(),
            fps: FpsMeter::new(),
            config,
        })
    }

    pub fn with_labels(mut self, labels: Labels) -> Self {
        self.labels = Some(labels);
        self
    }

    pub fn config(&self) -> &PredictorConfig {
        &self.config
    }

    pub fn spec(&self) -> &TensorSpec {
        self.decoder.spec()
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Replaces the thresholds used by subsequent calls.
    pub fn set_thresholds(&mut self, thresholds: Thresholds) -> Result<(), YoloError> {
        thresholds.validate()?;
        self.thresholds = thresholds;
        Ok(())
    }

    /// A frame context for this model's task and input size.
    pub fn frame(&self, width: u32, height: u32) -> Result<FrameContext, YoloError> {
        FrameContext::new(
            self.config.task,
            width,
            height,
            self.config.model_input_width,
            self.config.model_input_height,
        )
    }

    /// Runs the full pipeline on one frame's output.
    pub fn predict(
        &mut self,
        output: &RawTensorOutput,
        protos: Option<&RawTensorOutput>,
        ctx: &FrameContext,
    ) -> Result<DetectionResult, YoloError> {
        let started = Instant::now();
        let thresholds = self.thresholds;
        self.check_frame(output, ctx)?;

        let payload = if self.config.task == Task::Classify {
            self.classify(output)?
        } else {
            self.detect(output, protos, ctx, thresholds)?
        };

        let processing_ms = started.elapsed().as_secs_f64() * 1000.0;
        let fps = self.fps.tick(Instant::now());
        let result = DetectionResult::new(
            payload,
            FrameMetadata {
                width: ctx.width(),
                height: ctx.height(),
                processing_ms,
                fps,
            },
        )?;
        debug!(
            task = %result.task(),
            results = result.len(),
            processing_ms,
            "frame processed"
        );
        Ok(result)
    }

    fn check_frame(&self, output: &RawTensorOutput, ctx: &FrameContext) -> Result<(), YoloError> {
        if ctx.task() != self.config.task {
            return Err(YoloError::InvalidFrame(format!(
                "frame is for a {} model but the predictor runs {}",
                ctx.task(),
                self.config.task
            )));
        }
        if ctx.model_input_width() != self.config.model_input_width
            || ctx.model_input_height() != self.config.model_input_height
        {
            return Err(YoloError::InvalidFrame(format!(
                "frame model input {}x{} differs from configured {}x{}",
                ctx.model_input_width(),
                ctx.model_input_height(),
                self.config.model_input_width,
                self.config.model_input_height
            )));
        }
        if output.shape() != self.output_shape.as_slice() {
            return Err(YoloError::ShapeMismatch {
                task: self.config.task,
                shape: output.shape().to_vec(),
                expected: self.decoder.spec().features,
            });
        }
        Ok(())
    }

    fn label(&self, class_id: usize) -> Option<String> {
        self.labels
            .as_ref()
            .and_then(|l| l.get(class_id))
            .map(str::to_string)
    }

    fn classify(&mut self, output: &RawTensorOutput) -> Result<TaskResult, YoloError> {
        self.decoder
            .classify(output.data(), self.config.top_k, &mut self.ranked)?;
        let ranked = self
            .ranked
            .iter()
            .map(|&(class_id, score)| ClassScore {
                class_id,
                label: self.label(class_id),
                score,
            })
            .collect();
        Ok(TaskResult::Classify {
            classification: Classification { ranked },
        })
    }

    fn detect(
        &mut self,
        output: &RawTensorOutput,
        protos: Option<&RawTensorOutput>,
        ctx: &FrameContext,
        thresholds: Thresholds,
    ) -> Result<TaskResult, YoloError> {
        let task = self.config.task;
        let proto_data = match (task, self.decoder.spec().protos) {
            (Task::Segment, Some(spec)) => {
                let protos = protos.ok_or(YoloError::MissingPrototypes)?;
                if protos.len() != spec.len() {
                    return Err(YoloError::BufferLength {
                        shape: protos.shape().to_vec(),
                        expected: spec.len(),
                        actual: protos.len(),
                    });
                }
                Some((spec, protos.data()))
            }
            _ => None,
        };

        let decoded = self
            .decoder
            .decode(output.data(), thresholds.confidence, &mut self.arena)?;

        let input_width = f64::from(self.config.model_input_width);
        let input_height = f64::from(self.config.model_input_height);
        let params = NmsParams {
            iou_threshold: thresholds.iou,
            max_outputs: thresholds.max_outputs,
            single_group: self.config.class_agnostic || task == Task::Pose,
            overlap: if task == Task::Obb {
                Overlap::Oriented {
                    mode: self.config.obb_iou,
                    input_width,
                    input_height,
                }
            } else {
                Overlap::Boxes
            },
        };

        let Self {
            arena,
            nms,
            masks,
            labels,
            ..
        } = self;
        let kept = nms.suppress(arena.candidates_mut(), &params);
        debug!(candidates = decoded, kept = kept.len(), "suppression done");

        let mapper = CoordinateMapper::new(ctx);
        let label = |class_id: usize| {
            labels
                .as_ref()
                .and_then(|l| l.get(class_id))
                .map(str::to_string)
        };
        let handles = kept.iter().filter_map(|&i| arena.handle(i));

        let payload = match task {
            Task::Detect => TaskResult::Detect {
                detections: handles
                    .map(|h| {
                        let c = arena.get(h);
                        Detection {
                            class_id: c.class_id,
                            label: label(c.class_id),
                            confidence: c.confidence,
                            bbox: mapper.map_box(&c.bbox),
                        }
                    })
                    .collect(),
            },
            Task::Segment => {
                let instances: Vec<SegmentInstance> = handles
                    .map(|h| {
                        let c = arena.get(h);
                        let bbox = mapper.map_box(&c.bbox);
                        let mask = proto_data.and_then(|(spec, data)| {
                            masks.reconstruct(
                                arena.coefficients(h),
                                data,
                                &spec,
                                &c.bbox,
                                &bbox,
                                &mapper,
                            )
                        });
                        SegmentInstance {
                            detection: Detection {
                                class_id: c.class_id,
                                label: label(c.class_id),
                                confidence: c.confidence,
                                bbox,
                            },
                            mask,
                        }
                    })
                    .collect();
                let union_mask = Mask::union(
                    instances
                        .iter()
                        .filter_map(|i| i.mask.as_ref().map(|m| &m.mask)),
                );
                TaskResult::Segment {
                    instances,
                    union_mask,
                }
            }
            Task::Pose => TaskResult::Pose {
                instances: handles
                    .map(|h| {
                        let c = arena.get(h);
                        let raw = arena.keypoints(h);
                        let keypoints = std::array::from_fn(|k| {
                            let kp = raw.get(k).copied().unwrap_or_default();
                            let (normalized, pixel) = mapper.map_point(kp.position);
                            Keypoint {
                                name: COCO_KEYPOINT_NAMES[k],
                                normalized,
                                pixel,
                                confidence: kp.confidence,
                            }
                        });
                        PoseInstance {
                            detection: Detection {
                                class_id: 0,
                                label: label(0),
                                confidence: c.confidence,
                                bbox: mapper.map_box(&c.bbox),
                            },
                            keypoints,
                        }
                    })
                    .collect(),
            },
            Task::Obb => TaskResult::Obb {
                instances: handles
                    .map(|h| {
                        let c = arena.get(h);
                        let mapped =
                            mapper.map_oriented(&c.oriented_box(input_width, input_height));
                        ObbInstance {
                            detection: Detection {
                                class_id: c.class_id,
                                label: label(c.class_id),
                                confidence: c.confidence,
                                bbox: mapped.bbox,
                            },
                            oriented: mapped.oriented,
                            polygon: mapped.polygon,
                            polygon_pixel: mapped.polygon_pixel,
                        }
                    })
                    .collect(),
            },
            Task::Classify => TaskResult::empty(Task::Classify),
        };
        Ok(payload)
    }
}

/// Fuzz-only entrypoint for the full pipeline.
///
/// The first byte picks the task, rotation and mirroring; the rest is read
/// as little-endian `f32`s that fill a small output tensor (and prototype
/// tensor for segmentation), zero-padded.
#[cfg(feature = "fuzzing")]
pub fn fuzz_predict(input: &[u8]) -> Result<(), YoloError> {
    use crate::transform::Rotation;

    const CLASSES: usize = 3;
    const COEFFICIENTS: usize = 2;
    const PROTO_SIDE: usize = 4;
    const ANCHORS: usize = 8;

    let Some((&selector, rest)) = input.split_first() else {
        return Ok(());
    };
    let task = match selector % 5 {
        0 => Task::Detect,
        1 => Task::Segment,
        2 => Task::Classify,
        3 => Task::Pose,
        _ => Task::Obb,
    };
    let mut values = rest
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .chain(std::iter::repeat(0.0));

    let features = task.features_per_anchor(CLASSES, COEFFICIENTS);
    let output_shape = match task {
        Task::Classify => vec![1, features],
        _ => vec![1, features, ANCHORS],
    };
    let output_len = output_shape.iter().product();
    let output = RawTensorOutput::new(output_shape, values.by_ref().take(output_len).collect())?;
    let protos = match task {
        Task::Segment => {
            let shape = vec![1, PROTO_SIDE, PROTO_SIDE, COEFFICIENTS];
            let len = shape.iter().product();
            Some(RawTensorOutput::new(shape, values.take(len).collect())?)
        }
        _ => None,
    };

    let mut config = PredictorConfig::new(task, CLASSES);
    if task == Task::Pose {
        config.num_classes = 0;
    }
    let mut predictor = Predictor::new(
        config,
        output.shape(),
        protos.as_ref().map(RawTensorOutput::shape),
    )?;
    let rotation = if selector & 0x20 != 0 {
        Rotation::Deg270
    } else {
        Rotation::Deg90
    };
    let frame = predictor
        .frame(17, 9)?
        .rotated_for_camera(selector & 0x10 != 0)
        .with_camera_rotation(rotation)
        .mirrored(selector & 0x40 != 0);
    predictor.predict(&output, protos.as_ref(), &frame)?;
    Ok(())
}
