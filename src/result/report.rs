//! Human-readable rendering of a [`DetectionResult`].

use std::fmt;

use super::{Detection, DetectionResult, TaskResult};

struct DetectionLine<'a>(&'a Detection);

impl fmt::Display for DetectionLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = self.0;
        let p = &d.bbox.pixel;
        match &d.label {
            Some(label) => write!(f, "{} ({})", label, d.class_id)?,
            None => write!(f, "class {}", d.class_id)?,
        }
        write!(
            f,
            " {:.3} [{:.1}, {:.1}, {:.1}, {:.1}]",
            d.confidence,
            p.xmin(),
            p.ymin(),
            p.xmax(),
            p.ymax()
        )
    }
}

impl fmt::Display for DetectionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let meta = &self.metadata;
        write!(
            f,
            "{}: {} result(s) on {}x{} in {:.2} ms",
            self.task(),
            self.len(),
            meta.width,
            meta.height,
            meta.processing_ms
        )?;
        if let Some(fps) = meta.fps {
            write!(f, " ({:.1} fps)", fps)?;
        }
        writeln!(f)?;

        match &self.payload {
            TaskResult::Detect { detections } => {
                for (i, d) in detections.iter().enumerate() {
                    writeln!(f, "  [{}] {}", i, DetectionLine(d))?;
                }
            }
            TaskResult::Segment {
                instances,
                union_mask,
            } => {
                for (i, inst) in instances.iter().enumerate() {
                    write!(f, "  [{}] {}", i, DetectionLine(&inst.detection))?;
                    match &inst.mask {
                        Some(m) => writeln!(
                            f,
                            " mask {} px, outline {} pts",
                            m.mask.area(),
                            m.outline.len()
                        )?,
                        None => writeln!(f, " no mask")?,
                    }
                }
                if let Some(u) = union_mask {
                    writeln!(f, "  union mask: {} px", u.area())?;
                }
            }
            TaskResult::Pose { instances } => {
                for (i, inst) in instances.iter().enumerate() {
                    let visible = inst
                        .keypoints
                        .iter()
                        .filter(|k| k.confidence >= 0.5)
                        .count();
                    writeln!(
                        f,
                        "  [{}] {} keypoints {}/{}",
                        i,
                        DetectionLine(&inst.detection),
                        visible,
                        inst.keypoints.len()
                    )?;
                }
            }
            TaskResult::Obb { instances } => {
                for (i, inst) in instances.iter().enumerate() {
                    let o = &inst.oriented;
                    writeln!(
                        f,
                        "  [{}] {} rotated ({:.1}, {:.1}) {:.1}x{:.1} @ {:.3} rad",
                        i,
                        DetectionLine(&inst.detection),
                        o.cx,
                        o.cy,
                        o.width,
                        o.height,
                        o.angle
                    )?;
                }
            }
            TaskResult::Classify { classification } => {
                for (rank, c) in classification.ranked.iter().enumerate() {
                    match &c.label {
                        Some(label) => writeln!(
                            f,
                            "  #{} {} ({}) {:.3}",
                            rank + 1,
                            label,
                            c.class_id,
                            c.score
                        )?,
                        None => {
                            writeln!(f, "  #{} class {} {:.3}", rank + 1, c.class_id, c.score)?
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
