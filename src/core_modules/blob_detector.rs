// THEORY:
// The blob detector is the engine of the whole crate. It walks a `LuminanceMap` in
// raster order (x outer, y inner) and, every time it lands on an unvisited boundary
// pixel, grows a new `Blob` from it by exploring 4-connected neighbors.
//
// Key architectural principles & algorithm steps:
// 1.  **Edge Test**: A pixel is a blob edge when its four orthogonal neighbors
//     disagree about being inside the threshold: some are, some are not. Pixels deep
//     inside a region or deep in the background never qualify.
// 2.  **Boundary Growth**: From a seed edge pixel the detector visits neighbors
//     left, right, up, down. Every visited pixel is marked, but only edge pixels are
//     recorded and only edge pixels spread further, so the exploration runs along the
//     boundary band of the region and stops at its interior and exterior.
// 3.  **Explicit Worklist**: Growth uses a heap-allocated stack of pending
//     coordinates, pushed in reverse so they pop in left, right, up, down order. The
//     vertex order is exactly that of a recursive depth-first walk, without any
//     dependency on thread stack size. An optional bound on pending pixels abandons
//     growth of a runaway blob while the scan carries on.
// 4.  **Caller Decides**: Each finished blob goes through the callback's filter.
//     Only accepted blobs count towards `max_number_of_blobs` and get delivered.
// 5.  **Cooperative Cancellation**: The scan checks the cancellation gate at every
//     raster position and every exploration step, and every callback runs through
//     the gate, so nothing is delivered once cancellation has been observed.

use crate::core_modules::blob::Blob;
use crate::core_modules::luminance_map::LuminanceMap;
use crate::core_modules::worker::CancellationGate;
use log::{debug, trace, warn};

/// Default cap on the number of accepted blobs per scan.
pub const DEFAULT_MAX_NUMBER_OF_BLOBS: usize = 10_000;

/// The capability interface a caller implements to receive scan results.
///
/// Every method runs on the detection worker thread.
pub trait BlobDetectionCallback: Send {
    /// Called once per accepted blob, in raster discovery order.
    fn on_blob_detected(&mut self, blob: Blob);

    /// Decides whether a candidate blob is counted and delivered.
    fn filter_blob(&self, blob: &Blob) -> bool;

    /// Called exactly once per completed scan, after every `on_blob_detected`.
    fn on_blob_detection_finish(&mut self);
}

/// Bounds applied to a single scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanLimits {
    pub max_number_of_blobs: usize,
    /// Largest exploration worklist tolerated for one blob. `None` never abandons.
    pub max_pending_pixels: Option<usize>,
}

impl Default for ScanLimits {
    fn default() -> Self {
        Self {
            max_number_of_blobs: DEFAULT_MAX_NUMBER_OF_BLOBS,
            max_pending_pixels: None,
        }
    }
}

/// What a completed scan found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DetectionSummary {
    /// Blobs accepted by the filter and delivered.
    pub blobs_detected: usize,
    /// Blobs traced and offered to the filter.
    pub candidates_examined: usize,
    /// Blobs whose growth stopped early at the pending-pixel bound.
    pub abandoned_blobs: usize,
    /// The scan stopped because `max_number_of_blobs` was reached.
    pub cap_reached: bool,
}

/// True when the four orthogonal neighbors of `(x, y)` are a mix of inside and outside.
pub fn is_blob_edge(map: &LuminanceMap, x: usize, y: usize) -> bool {
    let neighbours = [
        map.is_inside_blob(x.wrapping_sub(1), y),
        map.is_inside_blob(x + 1, y),
        map.is_inside_blob(x, y.wrapping_sub(1)),
        map.is_inside_blob(x, y + 1),
    ];
    let inside = neighbours.iter().filter(|&&inside| inside).count();
    inside != 0 && inside != neighbours.len()
}

/// Resets `map`, scans it synchronously on the calling thread and fires the finish
/// callback.
pub fn find_blobs(
    map: &mut LuminanceMap,
    limits: &ScanLimits,
    callback: &mut dyn BlobDetectionCallback,
) -> DetectionSummary {
    detect(map, limits, callback, &CancellationGate::new()).unwrap_or_default()
}

/// One full detection pass. `None` when the gate was cancelled before the finish
/// callback could be delivered.
pub(crate) fn detect(
    map: &mut LuminanceMap,
    limits: &ScanLimits,
    callback: &mut dyn BlobDetectionCallback,
    gate: &CancellationGate,
) -> Option<DetectionSummary> {
    map.reset();
    let summary = BlobScanner::new(map, *limits, gate).run(callback)?;
    debug!(
        "scan finished: {} blobs delivered out of {} candidates ({} abandoned, cap reached: {})",
        summary.blobs_detected,
        summary.candidates_examined,
        summary.abandoned_blobs,
        summary.cap_reached
    );
    gate.dispatch(|| callback.on_blob_detection_finish())?;
    Some(summary)
}

struct BlobScanner<'a> {
    map: &'a mut LuminanceMap,
    limits: ScanLimits,
    gate: &'a CancellationGate,
    pending: Vec<(usize, usize)>,
    summary: DetectionSummary,
}

impl<'a> BlobScanner<'a> {
    fn new(map: &'a mut LuminanceMap, limits: ScanLimits, gate: &'a CancellationGate) -> Self {
        Self {
            map,
            limits,
            gate,
            pending: Vec::new(),
            summary: DetectionSummary::default(),
        }
    }

    fn run(mut self, callback: &mut dyn BlobDetectionCallback) -> Option<DetectionSummary> {
        let (width, height) = (self.map.width(), self.map.height());

        // --- 1. Raster Scan for Unvisited Edge Seeds ---
        'scan: for x in 0..width {
            for y in 0..height {
                if self.gate.is_cancelled() {
                    return None;
                }
                if self.summary.blobs_detected >= self.limits.max_number_of_blobs {
                    break 'scan;
                }
                if self.map.is_visited(x, y) || !is_blob_edge(self.map, x, y) {
                    continue;
                }

                // --- 2. Boundary Growth ---
                let blob = self.trace_blob(x, y)?;
                self.summary.candidates_examined += 1;

                // --- 3. Filtering & Delivery ---
                let accepted = self.gate.dispatch(|| callback.filter_blob(&blob))?;
                trace!(
                    "blob seeded at ({x}, {y}) with {} vertices, area {:.6}: {}",
                    blob.edge_count(),
                    blob.area(),
                    if accepted { "accepted" } else { "rejected" }
                );
                if accepted {
                    self.summary.blobs_detected += 1;
                    self.gate.dispatch(|| callback.on_blob_detected(blob))?;
                }
            }
        }

        // --- Summary ---
        self.summary.cap_reached = self.summary.blobs_detected >= self.limits.max_number_of_blobs;
        Some(self.summary)
    }

    fn trace_blob(&mut self, seed_x: usize, seed_y: usize) -> Option<Blob> {
        let mut blob = Blob::new();
        self.pending.clear();
        self.pending.push((seed_x, seed_y));

        while let Some((x, y)) = self.pending.pop() {
            if self.gate.is_cancelled() {
                return None;
            }
            if self.map.is_visited(x, y) {
                continue;
            }
            self.map.visit(x, y);
            if !is_blob_edge(self.map, x, y) {
                continue;
            }

            blob.add_edge_vertex(self.map.normalize(x, y).into());

            // --- Runaway Guard ---
            if let Some(limit) = self.limits.max_pending_pixels {
                if self.pending.len() + 4 > limit {
                    warn!(
                        "abandoning blob seeded at ({seed_x}, {seed_y}) after {} vertices: more than {limit} pending pixels",
                        blob.edge_count()
                    );
                    self.pending.clear();
                    self.summary.abandoned_blobs += 1;
                    break;
                }
            }

            // --- Spread: left, right, up, down ---
            // Visited pixels never reach here, so x and y are clear of the border.
            self.pending
                .extend([(x, y + 1), (x, y - 1), (x + 1, y), (x - 1, y)]);
        }

        Some(blob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::argb_image::{ArgbImage, argb};
    use crate::core_modules::blob::EdgeVertex;
    use approx::assert_abs_diff_eq;

    /// Keeps everything it is handed, in order.
    #[derive(Default)]
    struct Collector {
        blobs: Vec<Blob>,
        finished: usize,
        reject_all: bool,
    }

    impl BlobDetectionCallback for Collector {
        fn on_blob_detected(&mut self, blob: Blob) {
            self.blobs.push(blob);
        }

        fn filter_blob(&self, _blob: &Blob) -> bool {
            !self.reject_all
        }

        fn on_blob_detection_finish(&mut self) {
            self.finished += 1;
        }
    }

    const DARK: u32 = 0xFF00_0000;
    const LIGHT: u32 = 0xFFFF_FFFF;

    /// Dark axis-aligned rectangles (inclusive corners) on a white background.
    fn rectangles(width: usize, height: usize, rects: &[(usize, usize, usize, usize)]) -> ArgbImage {
        ArgbImage::from_fn(width, height, |x, y| {
            let inside = rects
                .iter()
                .any(|&(x0, y0, x1, y1)| (x0..=x1).contains(&x) && (y0..=y1).contains(&y));
            if inside { DARK } else { LIGHT }
        })
        .unwrap()
    }

    fn scan(image: &ArgbImage, threshold: f32, limits: ScanLimits, collector: &mut Collector) -> DetectionSummary {
        let mut map = LuminanceMap::from_image(image);
        map.set_threshold(threshold).unwrap();
        find_blobs(&mut map, &limits, collector)
    }

    /// Straightforward recursive walk, used to check the worklist reproduces it.
    fn recursive_vertices(map: &mut LuminanceMap, x: usize, y: usize, out: &mut Vec<(usize, usize)>) {
        if map.is_visited(x, y) {
            return;
        }
        map.visit(x, y);
        if is_blob_edge(map, x, y) {
            out.push((x, y));
            recursive_vertices(map, x - 1, y, out);
            recursive_vertices(map, x + 1, y, out);
            recursive_vertices(map, x, y - 1, out);
            recursive_vertices(map, x, y + 1, out);
        }
    }

    #[test]
    fn uniform_image_has_no_edges() {
        for level in [0u8, 90, 255] {
            let image = ArgbImage::from_fn(40, 40, |_, _| argb::gray(level)).unwrap();
            for threshold in [0.0, 0.2, 0.5, 0.8, 1.0] {
                let mut collector = Collector::default();
                let summary = scan(&image, threshold, ScanLimits::default(), &mut collector);
                assert_eq!(summary.candidates_examined, 0);
                assert!(collector.blobs.is_empty());
                assert_eq!(collector.finished, 1);
            }
        }
    }

    #[test]
    fn single_rectangle_yields_one_blob_with_matching_bounds() {
        let (width, height) = (60, 50);
        let image = rectangles(width, height, &[(15, 12, 40, 30)]);
        let mut collector = Collector::default();
        let summary = scan(&image, 0.5, ScanLimits::default(), &mut collector);

        assert_eq!(summary.blobs_detected, 1);
        assert_eq!(collector.blobs.len(), 1);
        let blob = &collector.blobs[0];
        let (top_left, bottom_right) = blob.bounding_box();
        let pixel_x = 1.0 / width as f32;
        let pixel_y = 1.0 / height as f32;
        assert_abs_diff_eq!(top_left.x, 15.0 / width as f32, epsilon = pixel_x + 1e-6);
        assert_abs_diff_eq!(top_left.y, 12.0 / height as f32, epsilon = pixel_y + 1e-6);
        assert_abs_diff_eq!(bottom_right.x, 40.0 / width as f32, epsilon = pixel_x + 1e-6);
        assert_abs_diff_eq!(bottom_right.y, 30.0 / height as f32, epsilon = pixel_y + 1e-6);
    }

    #[test]
    fn blob_starts_at_first_edge_in_raster_order() {
        let image = rectangles(40, 40, &[(10, 10, 20, 20)]);
        let mut collector = Collector::default();
        scan(&image, 0.5, ScanLimits::default(), &mut collector);

        // Column 9 is outside the rectangle; (9, 10) is the first pixel with a dark neighbor.
        let first = collector.blobs[0].edge_vertex(0).unwrap();
        assert_eq!(first, EdgeVertex::new(9.0 / 40.0, 10.0 / 40.0));
    }

    #[test]
    fn worklist_matches_recursive_vertex_order() {
        let image = ArgbImage::from_fn(48, 48, |x, y| {
            let dx = x as f32 - 22.0;
            let dy = y as f32 - 25.0;
            let ring = (dx * dx + dy * dy).sqrt();
            if ring < 14.0 && (x * 7 + y * 3) % 11 != 0 { DARK } else { LIGHT }
        })
        .unwrap();

        let mut collector = Collector::default();
        scan(&image, 0.5, ScanLimits::default(), &mut collector);
        assert!(!collector.blobs.is_empty());

        let mut map = LuminanceMap::from_image(&image);
        map.set_threshold(0.5).unwrap();
        map.reset();
        let mut expected = Vec::new();
        for x in 0..48 {
            for y in 0..48 {
                if map.is_visited(x, y) || !is_blob_edge(&map, x, y) {
                    continue;
                }
                let mut vertices = Vec::new();
                recursive_vertices(&mut map, x, y, &mut vertices);
                expected.push(
                    vertices
                        .into_iter()
                        .map(|(x, y)| EdgeVertex::new(x as f32 / 48.0, y as f32 / 48.0))
                        .collect::<Vec<_>>(),
                );
            }
        }

        let actual: Vec<Vec<EdgeVertex>> = collector.blobs.iter().map(|b| b.edge_vertices().to_vec()).collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn rejecting_filter_delivers_nothing_but_still_finishes() {
        let image = rectangles(60, 60, &[(10, 10, 20, 20), (35, 35, 50, 50)]);
        let mut collector = Collector {
            reject_all: true,
            ..Collector::default()
        };
        let summary = scan(&image, 0.5, ScanLimits::default(), &mut collector);

        assert_eq!(summary.candidates_examined, 2);
        assert_eq!(summary.blobs_detected, 0);
        assert!(collector.blobs.is_empty());
        assert_eq!(collector.finished, 1);
    }

    #[test]
    fn cap_keeps_the_first_blobs_in_raster_order() {
        let rects = [(8, 8, 12, 12), (20, 30, 24, 34), (32, 10, 36, 14), (44, 40, 48, 44)];
        let image = rectangles(60, 60, &rects);
        let limits = ScanLimits {
            max_number_of_blobs: 2,
            ..ScanLimits::default()
        };
        let mut collector = Collector::default();
        let summary = scan(&image, 0.5, limits, &mut collector);

        assert!(summary.cap_reached);
        assert_eq!(summary.blobs_detected, 2);
        assert_eq!(collector.blobs.len(), 2);
        assert_eq!(collector.finished, 1);
        // x is the outer loop, so blobs arrive sorted by their leftmost column.
        assert!(collector.blobs[0].bounding_box().0.x < 10.0 / 60.0);
        let second = collector.blobs[1].bounding_box().0.x;
        assert!(second > 18.0 / 60.0 && second < 21.0 / 60.0);
    }

    #[test]
    fn zero_cap_delivers_nothing() {
        let image = rectangles(40, 40, &[(10, 10, 20, 20)]);
        let limits = ScanLimits {
            max_number_of_blobs: 0,
            ..ScanLimits::default()
        };
        let mut collector = Collector::default();
        let summary = scan(&image, 0.5, limits, &mut collector);
        assert!(summary.cap_reached);
        assert_eq!(summary.candidates_examined, 0);
        assert_eq!(collector.finished, 1);
    }

    #[test]
    fn pending_bound_abandons_only_the_runaway_blob() {
        let image = rectangles(120, 120, &[(10, 10, 100, 100)]);
        let limits = ScanLimits {
            max_pending_pixels: Some(16),
            ..ScanLimits::default()
        };
        let mut collector = Collector::default();
        let summary = scan(&image, 0.5, limits, &mut collector);

        assert!(summary.abandoned_blobs >= 1);
        assert_eq!(collector.finished, 1);
        let unbounded = {
            let mut full = Collector::default();
            scan(&image, 0.5, ScanLimits::default(), &mut full);
            full.blobs[0].edge_count()
        };
        assert!(collector.blobs[0].edge_count() < unbounded);
    }

    #[test]
    fn tracing_stops_once_cancelled() {
        let image = rectangles(40, 40, &[(10, 10, 20, 20)]);
        let mut map = LuminanceMap::from_image(&image);
        map.set_threshold(0.5).unwrap();
        map.reset();

        let gate = CancellationGate::new();
        let mut scanner = BlobScanner::new(&mut map, ScanLimits::default(), &gate);
        assert!(scanner.trace_blob(9, 10).is_some());

        gate.cancel();
        let mut scanner = BlobScanner::new(&mut map, ScanLimits::default(), &gate);
        assert!(scanner.trace_blob(9, 12).is_none());
    }

    #[test]
    fn cancelled_gate_suppresses_the_whole_pass() {
        let image = rectangles(40, 40, &[(10, 10, 20, 20)]);
        let mut map = LuminanceMap::from_image(&image);
        map.set_threshold(0.5).unwrap();
        let gate = CancellationGate::new();
        gate.cancel();

        let mut collector = Collector::default();
        assert_eq!(detect(&mut map, &ScanLimits::default(), &mut collector, &gate), None);
        assert!(collector.blobs.is_empty());
        assert_eq!(collector.finished, 0);
    }

    #[test]
    fn edge_test_needs_mixed_neighbours() {
        let image = rectangles(30, 30, &[(10, 10, 19, 19)]);
        let mut map = LuminanceMap::from_image(&image);
        map.set_threshold(0.5).unwrap();
        map.reset();

        assert!(is_blob_edge(&map, 10, 15)); // inner boundary
        assert!(is_blob_edge(&map, 9, 15)); // outer boundary
        assert!(!is_blob_edge(&map, 15, 15)); // interior
        assert!(!is_blob_edge(&map, 6, 6)); // background
        assert!(!is_blob_edge(&map, 9, 9)); // diagonal corner only
    }

    #[test]
    fn vertices_are_normalized_by_image_dimensions() {
        let image = rectangles(100, 40, &[(30, 10, 60, 25)]);
        let mut collector = Collector::default();
        scan(&image, 0.5, ScanLimits::default(), &mut collector);

        for vertex in collector.blobs[0].edge_vertices() {
            assert!((0.0..1.0).contains(&vertex.x));
            assert!((0.0..1.0).contains(&vertex.y));
            assert_abs_diff_eq!((vertex.x * 100.0).round(), vertex.x * 100.0, epsilon = 1e-3);
            assert_abs_diff_eq!((vertex.y * 40.0).round(), vertex.y * 40.0, epsilon = 1e-3);
        }
    }
}
