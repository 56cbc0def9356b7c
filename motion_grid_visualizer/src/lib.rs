// THEORY:
// The visualizer turns tick reports into pictures for humans. It never feeds
// anything back into the engine.
//
// 1.  **Render**: `render_overlay` paints the change mask, tints every cell by
//     how much of it changed, outlines the grid and highlights the winner.
// 2.  **Encode**: rendered frames are PNG-encoded once into a `FramePacket`
//     so every subscriber shares the same bytes.
// 3.  **Fan out**: the `FrameBus` broadcasts packets and `Meta` summaries.
//     Slow subscribers lag and skip frames; the publisher never waits.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use image::{DynamicImage, GrayImage, ImageFormat, Rgba, RgbaImage};
use motion_grid::core_modules::frame_differ::CHANGED;
use motion_grid::core_modules::grid::Rect;
use motion_grid::{CellMotion, ChangeMask, GridAggregator, PipelineConfig, TickReport};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

const BACKGROUND: Rgba<u8> = Rgba([16, 16, 16, 255]);
const CHANGED_PIXEL: Rgba<u8> = Rgba([200, 200, 200, 255]);
const CELL_TINT: [u8; 3] = [40, 120, 255];
const CELL_OUTLINE: Rgba<u8> = Rgba([60, 160, 60, 255]);
const WINNER_OUTLINE: Rgba<u8> = Rgba([255, 48, 48, 255]);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    Png,
}

#[derive(Debug, Clone)]
pub struct FramePacket {
    pub ts_millis: u64,
    pub width: u32,
    pub height: u32,
    pub format: FrameFormat,
    pub data: Arc<[u8]>,
}

impl FramePacket {
    /// PNG-encodes a rendered overlay.
    pub fn encode(image: &RgbaImage) -> anyhow::Result<Self> {
        let mut buf = Vec::new();
        DynamicImage::ImageRgba8(image.clone())
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .context("failed to encode overlay as PNG")?;
        Ok(Self {
            ts_millis: now_millis(),
            width: image.width(),
            height: image.height(),
            format: FrameFormat::Png,
            data: Arc::from(buf),
        })
    }
}

/// Per-tick summary published next to each frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    pub tick: u64,
    pub motion_value: u64,
    pub max_x: f32,
    pub max_y: f32,
    pub winner: usize,
}

#[derive(Clone)]
pub struct FrameBus {
    pub frames_tx: broadcast::Sender<FramePacket>,
    pub meta_tx: broadcast::Sender<Meta>,
}

impl FrameBus {
    pub fn new(capacity: usize) -> Self {
        let (frames_tx, _) = broadcast::channel::<FramePacket>(capacity.max(1));
        let (meta_tx, _) = broadcast::channel::<Meta>(capacity.max(1));
        Self { frames_tx, meta_tx }
    }

    /// Broadcasts a frame and its summary. Having no subscribers is not an
    /// error.
    pub fn publish(&self, packet: FramePacket, meta: Meta) {
        let tick = meta.tick;
        if self.frames_tx.send(packet).is_err() {
            debug!(tick, "no frame subscribers");
        }
        if self.meta_tx.send(meta).is_err() {
            debug!(tick, "no meta subscribers");
        }
    }
}

/// Paints one overlay frame.
///
/// The mask (if any) is drawn first, then each cell is tinted in proportion
/// to `count / area` and outlined. The winning cell gets a thicker highlight.
pub fn render_overlay(
    mask: Option<&GrayImage>,
    cells: &[CellMotion],
    winner: usize,
    canvas: (u32, u32),
) -> RgbaImage {
    let (width, height) = canvas;
    let mut out = RgbaImage::from_pixel(width, height, BACKGROUND);

    if let Some(mask) = mask.filter(|m| m.dimensions() == canvas) {
        for (x, y, px) in mask.enumerate_pixels() {
            if px.0[0] == CHANGED {
                out.put_pixel(x, y, CHANGED_PIXEL);
            }
        }
    }

    for motion in cells {
        let rect = motion.cell.rect;
        let area = rect.area().max(1);
        let alpha = (motion.count.min(area) as f32 / area as f32) * 0.6;
        if alpha > 0.0 {
            tint(&mut out, &rect, alpha);
        }
        outline(&mut out, &rect, 1, CELL_OUTLINE);
    }

    if let Some(motion) = cells.iter().find(|m| m.cell.index == winner) {
        outline(&mut out, &motion.cell.rect, 2, WINNER_OUTLINE);
    }
    out
}

fn tint(image: &mut RgbaImage, rect: &Rect, alpha: f32) {
    for y in rect.y..rect.bottom().min(image.height()) {
        for x in rect.x..rect.right().min(image.width()) {
            let px = image.get_pixel_mut(x, y);
            for (channel, tint) in px.0.iter_mut().zip(CELL_TINT) {
                *channel = (*channel as f32 * (1.0 - alpha) + tint as f32 * alpha).round() as u8;
            }
        }
    }
}

fn outline(image: &mut RgbaImage, rect: &Rect, thickness: u32, color: Rgba<u8>) {
    let right = rect.right().min(image.width());
    let bottom = rect.bottom().min(image.height());
    for y in rect.y..bottom {
        for x in rect.x..right {
            let on_edge = x < rect.x + thickness
                || y < rect.y + thickness
                || x + thickness >= right
                || y + thickness >= bottom;
            if on_edge {
                image.put_pixel(x, y, color);
            }
        }
    }
}

/// Renders tick reports with a grid that mirrors the pipeline's.
///
/// The renderer keeps its own aggregator and re-counts each report's mask, so
/// it can run on a separate task from the pipeline.
pub struct OverlayRenderer {
    aggregator: GridAggregator,
    canvas: (u32, u32),
    last_mask: Option<ChangeMask>,
}

impl OverlayRenderer {
    pub fn new(config: &PipelineConfig) -> anyhow::Result<Self> {
        let aggregator =
            GridAggregator::configure(config.canvas_width, config.canvas_height, config.cell_count)
                .context("failed to configure overlay grid")?;
        Ok(Self {
            aggregator,
            canvas: (config.canvas_width, config.canvas_height),
            last_mask: None,
        })
    }

    /// Renders a report. Ticks without a mask redraw the last one.
    pub fn render(&mut self, report: &TickReport) -> anyhow::Result<(RgbaImage, Meta)> {
        if let Some(mask) = &report.mask {
            self.aggregator
                .count_pixels(mask)
                .context("mask does not match the overlay grid")?;
            self.last_mask = Some(mask.clone());
        }

        let cells: Vec<CellMotion> = self.aggregator.cells().collect();
        let image = render_overlay(
            self.last_mask.as_ref().map(ChangeMask::image),
            &cells,
            self.aggregator.winner_index(),
            self.canvas,
        );
        let meta = Meta {
            tick: report.tick,
            motion_value: report.signal.motion_value,
            max_x: report.signal.max_x,
            max_y: report.signal.max_y,
            winner: self.aggregator.winner_index(),
        };
        Ok((image, meta))
    }

    /// Renders, encodes and broadcasts one report.
    pub fn publish(&mut self, bus: &FrameBus, report: &TickReport) -> anyhow::Result<()> {
        let (image, meta) = self.render(report)?;
        bus.publish(FramePacket::encode(&image)?, meta);
        Ok(())
    }
}

/// Keeps `path` holding the most recent frame and `path` with a `.json`
/// extension holding its `Meta`. Files are replaced through a rename so
/// readers never see a partial write.
pub fn spawn_overlay_writer(bus: &FrameBus, path: PathBuf) -> tokio::task::JoinHandle<()> {
    let mut frames = bus.frames_tx.subscribe();
    let mut metas = bus.meta_tx.subscribe();
    let meta_path = path.with_extension("json");

    tokio::spawn(async move {
        let mut frames_open = true;
        let mut metas_open = true;
        while frames_open || metas_open {
            tokio::select! {
                frame = frames.recv(), if frames_open => match frame {
                    Ok(packet) => {
                        if let Err(err) = replace_file(&path, &packet.data).await {
                            warn!(path = %path.display(), error = %err, "failed to write overlay frame");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "overlay writer lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => frames_open = false,
                },
                meta = metas.recv(), if metas_open => match meta {
                    Ok(meta) => {
                        let written = match serde_json::to_vec_pretty(&meta) {
                            Ok(json) => replace_file(&meta_path, &json).await,
                            Err(err) => Err(err.into()),
                        };
                        if let Err(err) = written {
                            warn!(path = %meta_path.display(), error = %err, "failed to write overlay meta");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => metas_open = false,
                },
            }
        }
        debug!(path = %path.display(), "overlay writer stopped");
    })
}

async fn replace_file(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, data)
        .await
        .with_context(|| format!("writing {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("renaming to {}", path.display()))?;
    Ok(())
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use motion_grid::{MotionPipeline, PipelineEvent};

    fn small_config() -> PipelineConfig {
        PipelineConfig {
            canvas_width: 40,
            canvas_height: 10,
            cell_count: 4,
            ..PipelineConfig::default()
        }
    }

    fn band_mask(from: u32, to: u32) -> GrayImage {
        GrayImage::from_fn(40, 10, |x, _| Luma([if (from..to).contains(&x) { 255 } else { 0 }]))
    }

    #[test]
    fn overlay_highlights_the_winning_cell() {
        let mut aggregator = GridAggregator::configure(40, 10, 4).unwrap();
        let mask = band_mask(20, 30);
        aggregator
            .count_pixels(&ChangeMask::from_image(mask.clone()))
            .unwrap();
        let cells: Vec<CellMotion> = aggregator.cells().collect();

        let image = render_overlay(Some(&mask), &cells, aggregator.winner_index(), (40, 10));
        assert_eq!(image.dimensions(), (40, 10));
        assert_eq!(image.get_pixel(20, 0), &WINNER_OUTLINE);
        assert_eq!(image.get_pixel(0, 0), &CELL_OUTLINE);

        // Inside the full cell the changed pixel is tinted; inside an idle cell
        // the background is left alone.
        assert_ne!(image.get_pixel(25, 5), &CHANGED_PIXEL);
        assert_ne!(image.get_pixel(25, 5), &BACKGROUND);
        assert_eq!(image.get_pixel(5, 5), &BACKGROUND);
    }

    #[test]
    fn mismatched_mask_is_ignored() {
        let image = render_overlay(Some(&GrayImage::new(3, 3)), &[], 0, (8, 8));
        assert!(image.pixels().all(|p| *p == BACKGROUND));
    }

    #[test]
    fn encoded_packet_decodes_back() {
        let image = RgbaImage::from_pixel(6, 4, WINNER_OUTLINE);
        let packet = FramePacket::encode(&image).unwrap();
        assert_eq!(packet.format, FrameFormat::Png);
        assert_eq!((packet.width, packet.height), (6, 4));

        let decoded = image::load_from_memory(&packet.data).unwrap().to_rgba8();
        assert_eq!(decoded, image);
    }

    #[test]
    fn renderer_recounts_pipeline_masks() {
        let config = small_config();
        let mut pipeline = MotionPipeline::new(config.clone()).unwrap();
        let mut renderer = OverlayRenderer::new(&config).unwrap();

        pipeline
            .tick(Ok(Some(band_mask(0, 0))), [PipelineEvent::CaptureBackground])
            .unwrap();
        let report = pipeline.tick(Ok(Some(band_mask(30, 40))), []).unwrap();

        let (image, meta) = renderer.render(&report).unwrap();
        assert_eq!(image.dimensions(), (40, 10));
        assert_eq!(meta.winner, pipeline.aggregator().winner_index());
        assert_eq!(meta.winner, 3);
        assert_eq!(meta.motion_value, report.signal.motion_value);
        assert_eq!(meta.tick, 2);
    }

    #[test]
    fn meta_serializes_as_plain_json() {
        let meta = Meta {
            tick: 7,
            motion_value: 15360,
            max_x: 0.5,
            max_y: 0.5,
            winner: 10,
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["winner"], 10);
        assert_eq!(json["motion_value"], 15360);
        assert_eq!(serde_json::from_value::<Meta>(json).unwrap(), meta);
    }

    #[tokio::test]
    async fn meta_reaches_subscribers_even_without_frame_readers() {
        let bus = FrameBus::new(2);
        let image = RgbaImage::from_pixel(2, 2, CELL_OUTLINE);

        // Nobody listens yet; publishing still succeeds.
        bus.publish(FramePacket::encode(&image).unwrap(), Meta::default());

        let mut metas = bus.meta_tx.subscribe();
        bus.publish(
            FramePacket::encode(&image).unwrap(),
            Meta {
                tick: 3,
                winner: 1,
                ..Meta::default()
            },
        );
        let meta = metas.recv().await.unwrap();
        assert_eq!(meta.tick, 3);
        assert_eq!(meta.winner, 1);
    }

    #[tokio::test]
    async fn writer_keeps_the_latest_frame_on_disk() {
        let dir = std::env::temp_dir().join(format!("motion_grid_overlay_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("overlay.png");

        let bus = FrameBus::new(4);
        let writer = spawn_overlay_writer(&bus, path.clone());

        let image = RgbaImage::from_pixel(4, 4, CELL_OUTLINE);
        bus.publish(
            FramePacket::encode(&image).unwrap(),
            Meta {
                tick: 1,
                ..Meta::default()
            },
        );
        drop(bus);
        writer.await.unwrap();

        let written = image::open(&path).unwrap().to_rgba8();
        assert_eq!(written, image);
        let meta: Meta =
            serde_json::from_slice(&std::fs::read(path.with_extension("json")).unwrap()).unwrap();
        assert_eq!(meta.tick, 1);
        std::fs::remove_dir_all(&dir).ok();
    }
}
