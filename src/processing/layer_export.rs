use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};
use rayon::prelude::*;

use crate::io::layer_record::LayerDocument;
use crate::io::png_writer::LayerImageWriter;
use crate::processing::compositor::{composite_layer, Placement};
use crate::processing::folder_stack::{traversal_order, FolderStack, IndexedLayer};
use crate::processing::layer_classification::{classify_layer, LayerKind};
use crate::processing::path_builder::{build_output_path, Layout};
use crate::utils::logging::{log_debug_ctx, log_info_ctx, log_warning_ctx};
use crate::utils::progress::{NoopProgress, ProgressSink};
use crate::utils::BufferPool;

/// Layer export parameters
#[derive(Clone, Debug)]
pub struct ExportOptions {
    pub output_dir: PathBuf,
    pub layout: Layout,
    /// Append the traversal index to names of layers that carry a layer id
    pub numbering: bool,
    /// Emit native layer bounds instead of full-canvas images
    pub crop: bool,
    pub parallel: bool,
}

impl ExportOptions {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            layout: Layout::Hierarchical,
            numbering: false,
            crop: false,
            parallel: false,
        }
    }
}

/// What a run produced
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExportSummary {
    /// Output path of every raster layer, in traversal order
    pub emitted: Vec<PathBuf>,
    pub skipped_empty: usize,
    pub folders: usize,
    /// Layers whose path repeats an earlier one; the later file wins
    pub collisions: usize,
    /// Folders still open when the layer list ended
    pub unclosed_folders: usize,
}

/// One raster layer with its output path, captured before any pixel work
#[derive(Clone, Debug)]
pub struct ExportJob<'a> {
    pub path: PathBuf,
    pub layer: IndexedLayer<'a>,
}

/// Walks a document's layers and hands each raster layer to the writer
pub struct LayerExporter<'a, D: ?Sized, W: ?Sized> {
    document: &'a D,
    writer: &'a W,
    options: ExportOptions,
    pool: BufferPool,
    progress: &'a dyn ProgressSink,
}

impl<'a, D, W> LayerExporter<'a, D, W>
where
    D: LayerDocument + Sync + ?Sized,
    W: LayerImageWriter + Sync + ?Sized,
{
    pub fn new(document: &'a D, writer: &'a W, options: ExportOptions) -> Self {
        Self {
            document,
            writer,
            options,
            pool: BufferPool::default(),
            progress: &NoopProgress,
        }
    }

    /// Report progress to the given sink
    pub fn with_progress(mut self, progress: &'a dyn ProgressSink) -> Self {
        self.progress = progress;
        self
    }

    /// Export every raster layer
    pub fn export(&self) -> Result<ExportSummary> {
        let total = self.document.records().len();
        self.progress
            .start_indeterminate(Some(&format!("Exporting {} layer records", total)));

        let summary = if self.options.parallel {
            self.export_parallel()?
        } else {
            self.export_sequential()?
        };

        if summary.unclosed_folders > 0 {
            log_warning_ctx(
                "export",
                format!("{} folder(s) still open at the end of the layer list", summary.unclosed_folders),
            );
        }
        self.progress.finish(Some(&format!("Exported {} layers", summary.emitted.len())));
        Ok(summary)
    }

    /// Single pass: classify, track folders, emit in traversal order
    fn export_sequential(&self) -> Result<ExportSummary> {
        let records = self.document.records();
        let mut stack = FolderStack::new();
        let mut summary = ExportSummary::default();
        let mut seen = HashSet::new();

        for layer in traversal_order(records) {
            match classify_layer(layer.record) {
                LayerKind::FolderOpen => {
                    stack.push(layer);
                    summary.folders += 1;
                }
                LayerKind::FolderClose => {
                    if !stack.pop() {
                        log_debug_ctx("export", format!("Unmatched folder close at index {}", layer.index));
                    }
                }
                LayerKind::Empty => summary.skipped_empty += 1,
                LayerKind::Raster => {
                    let path = self.output_path(stack.ancestors(), &layer);
                    if !seen.insert(path.clone()) {
                        summary.collisions += 1;
                        log_debug_ctx("export", format!("{} overwrites an earlier layer", path.display()));
                    }
                    self.emit(&layer, &path)?;
                    summary.emitted.push(path);
                }
            }
            self.progress.set((layer.index + 1) as f32 / records.len() as f32, None);
        }

        summary.unclosed_folders = stack.depth();
        Ok(summary)
    }

    /// Walk the layer list once and capture every raster layer's output path
    pub fn plan(&self) -> (Vec<ExportJob<'a>>, ExportSummary) {
        let document: &'a D = self.document;
        let records = document.records();
        let mut stack = FolderStack::new();
        let mut summary = ExportSummary::default();
        let mut jobs = Vec::new();

        for layer in traversal_order(records) {
            match classify_layer(layer.record) {
                LayerKind::FolderOpen => {
                    stack.push(layer);
                    summary.folders += 1;
                }
                LayerKind::FolderClose => {
                    stack.pop();
                }
                LayerKind::Empty => summary.skipped_empty += 1,
                LayerKind::Raster => {
                    let path = self.output_path(stack.ancestors(), &layer);
                    summary.emitted.push(path.clone());
                    jobs.push(ExportJob { path, layer });
                }
            }
        }

        summary.unclosed_folders = stack.depth();
        (jobs, summary)
    }

    /// Plan first, then decode and write the surviving jobs concurrently
    fn export_parallel(&self) -> Result<ExportSummary> {
        let (jobs, mut summary) = self.plan();
        let planned = jobs.len();
        let jobs = last_writer_wins(jobs);
        summary.collisions = planned - jobs.len();

        let done = AtomicUsize::new(0);
        jobs.par_iter().try_for_each(|job| {
            self.emit(&job.layer, &job.path)?;
            let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
            self.progress.set(finished as f32 / jobs.len().max(1) as f32, None);
            Ok::<(), anyhow::Error>(())
        })?;

        Ok(summary)
    }

    fn output_path(&self, ancestors: &[IndexedLayer<'_>], layer: &IndexedLayer<'_>) -> PathBuf {
        build_output_path(
            &self.options.output_dir,
            ancestors,
            layer,
            self.options.layout,
            self.options.numbering,
        )
    }

    /// Decode, composite and write one raster layer
    fn emit(&self, layer: &IndexedLayer<'_>, path: &Path) -> Result<()> {
        let record = layer.record;
        let raw = self
            .document
            .read_rgba(record)
            .with_context(|| format!("Failed to read pixels of layer '{}'", record.display_name()))?;

        let pixels = composite_layer(
            raw,
            Placement::of(record),
            self.document.canvas_size(),
            self.options.crop,
            &self.pool,
        );

        log_info_ctx("export", format!("Output: {}", path.display()));
        self.writer.write(path, pixels.width, pixels.height, &pixels.data)?;
        // Only canvas buffers are worth keeping; cropped ones vary in size
        if !self.options.crop {
            self.pool.return_u8_buffer(pixels.data);
        }
        Ok(())
    }
}

/// Drop every job whose path is written again later in traversal order
fn last_writer_wins(jobs: Vec<ExportJob<'_>>) -> Vec<ExportJob<'_>> {
    let mut last_index: HashMap<PathBuf, usize> = HashMap::with_capacity(jobs.len());
    for (i, job) in jobs.iter().enumerate() {
        last_index.insert(job.path.clone(), i);
    }
    jobs.into_iter()
        .enumerate()
        .filter(|(i, job)| last_index.get(&job.path) == Some(i))
        .map(|(_, job)| job)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::layer_record::testing::{record, MemoryDocument};
    use crate::io::layer_record::AdditionalInfo;
    use crate::io::png_writer::testing::RecordingWriter;
    use crate::io::png_writer::PngWriter;
    use std::sync::Mutex;

    fn export(doc: &MemoryDocument, options: ExportOptions) -> (ExportSummary, Vec<(PathBuf, u32, u32, Vec<u8>)>) {
        let writer = RecordingWriter::default();
        let summary = LayerExporter::new(doc, &writer, options).export().unwrap();
        (summary, writer.take())
    }

    fn scenario_b() -> MemoryDocument {
        MemoryDocument::new(50, 50)
            .folder("Group")
            .raster("Eye", 10, 10, 5, 5, 200)
            .end_folder()
    }

    #[test]
    fn test_scenario_a_single_full_canvas_layer() {
        let doc = MemoryDocument::new(100, 100).raster("Base", 0, 0, 100, 100, 7);
        let (summary, writes) = export(&doc, ExportOptions::new("out"));

        assert_eq!(writes.len(), 1);
        let (path, w, h, data) = &writes[0];
        assert_eq!(path, &Path::new("out").join("Base.png"));
        assert_eq!((*w, *h), (100, 100));
        assert_eq!(data, &doc.pixels[0]);
        assert_eq!(summary.emitted.len(), 1);
    }

    #[test]
    fn test_scenario_b_hierarchical_crop_and_canvas() {
        let doc = scenario_b();

        let mut options = ExportOptions::new("out");
        options.crop = true;
        let (_, writes) = export(&doc, options);
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].0, Path::new("out").join("Group").join("Eye.png"));
        assert_eq!((writes[0].1, writes[0].2), (5, 5));
        assert_eq!(writes[0].3, vec![200u8; 5 * 5 * 4]);

        let (summary, writes) = export(&doc, ExportOptions::new("out"));
        let (_, w, h, data) = &writes[0];
        assert_eq!((*w, *h), (50, 50));
        for (i, px) in data.chunks_exact(4).enumerate() {
            let (x, y) = (i % 50, i / 50);
            let inside = (10..15).contains(&x) && (10..15).contains(&y);
            assert_eq!(px, if inside { [200u8; 4] } else { [0u8; 4] });
        }
        assert_eq!(summary.folders, 1);
        assert_eq!(summary.unclosed_folders, 0);
    }

    #[test]
    fn test_scenario_c_flattened() {
        let mut options = ExportOptions::new("out");
        options.layout = Layout::Flattened;
        let (_, writes) = export(&scenario_b(), options);
        assert_eq!(writes[0].0, Path::new("out").join("Group_Eye.png"));
    }

    #[test]
    fn test_scenario_d_sanitized_name() {
        let doc = MemoryDocument::new(4, 4).raster("a/b", 0, 0, 1, 1, 1);
        let (_, writes) = export(&doc, ExportOptions::new("out"));
        assert_eq!(writes[0].0, Path::new("out").join("a_b.png"));
    }

    #[test]
    fn test_scenario_e_extra_close_is_ignored() {
        let doc = MemoryDocument::new(4, 4)
            .raster("After", 0, 0, 1, 1, 1)
            .end_folder()
            .folder("Group")
            .raster("Inner", 0, 0, 1, 1, 1)
            .end_folder()
            .end_folder()
            .raster("Bottom", 0, 0, 1, 1, 1);
        // traversal sees the top-most record first
        let (summary, writes) = export(&doc, ExportOptions::new("out"));
        let paths: Vec<PathBuf> = writes.into_iter().map(|w| w.0).collect();
        assert_eq!(
            paths,
            vec![
                Path::new("out").join("After.png"),
                Path::new("out").join("Group").join("Inner.png"),
                Path::new("out").join("Bottom.png"),
            ]
        );
        assert_eq!(summary.unclosed_folders, 0);
    }

    #[test]
    fn test_nested_folders_return_to_depth_zero() {
        let doc = MemoryDocument::new(8, 8)
            .folder("A")
            .folder("B")
            .raster("Deep", 0, 0, 2, 2, 3)
            .end_folder()
            .raster("Mid", 0, 0, 2, 2, 3)
            .end_folder()
            .raster("Top", 0, 0, 2, 2, 3);
        let (summary, writes) = export(&doc, ExportOptions::new("out"));

        let paths: Vec<PathBuf> = writes.into_iter().map(|w| w.0).collect();
        assert_eq!(
            paths,
            vec![
                Path::new("out").join("A").join("B").join("Deep.png"),
                Path::new("out").join("A").join("Mid.png"),
                Path::new("out").join("Top.png"),
            ]
        );
        assert_eq!(summary.folders, 2);
        assert_eq!(summary.unclosed_folders, 0);
    }

    #[test]
    fn test_unclosed_folder_is_tolerated() {
        let doc = MemoryDocument::new(4, 4).folder("Open").raster("Inside", 0, 0, 1, 1, 1);
        let (summary, writes) = export(&doc, ExportOptions::new("out"));
        assert_eq!(writes[0].0, Path::new("out").join("Open").join("Inside.png"));
        assert_eq!(summary.unclosed_folders, 1);
    }

    #[test]
    fn test_empty_layers_are_skipped() {
        let doc = MemoryDocument::new(4, 4)
            .raster("Nothing", 0, 0, 0, 0, 0)
            .raster("Something", 0, 0, 1, 1, 1);
        let (summary, writes) = export(&doc, ExportOptions::new("out"));
        assert_eq!(writes.len(), 1);
        assert_eq!(summary.skipped_empty, 1);
    }

    #[test]
    fn test_flattened_paths_have_no_subdirectories() {
        let doc = MemoryDocument::new(8, 8)
            .folder("A/x")
            .folder("B")
            .raster("C\\y", 0, 0, 1, 1, 1)
            .end_folder()
            .end_folder();
        let mut options = ExportOptions::new("out");
        options.layout = Layout::Flattened;
        let (_, writes) = export(&doc, options);
        assert_eq!(writes[0].0.parent(), Some(Path::new("out")));
        assert_eq!(writes[0].0, Path::new("out").join("A_x_B_C_y.png"));
    }

    #[test]
    fn test_numbering_uses_traversal_index() {
        let with_id = |name: &str| record(name, 0, 0, 1, 1).with_info(AdditionalInfo::LayerId(500));
        let doc = MemoryDocument::new(4, 4)
            .push_top_down(with_id("Hair"), vec![1; 4])
            .push_top_down(with_id("Hair"), vec![2; 4]);
        let mut options = ExportOptions::new("out");
        options.numbering = true;
        let (summary, writes) = export(&doc, options);
        assert_eq!(writes[0].0, Path::new("out").join("Hair0.png"));
        assert_eq!(writes[1].0, Path::new("out").join("Hair1.png"));
        assert_eq!(summary.collisions, 0);
    }

    #[test]
    fn test_collision_last_writer_wins() {
        let doc = MemoryDocument::new(2, 2)
            .raster("Same", 0, 0, 1, 1, 1)
            .raster("Same", 0, 0, 1, 1, 2);

        let (summary, writes) = export(&doc, ExportOptions::new("out"));
        assert_eq!(summary.collisions, 1);
        assert_eq!(writes.last().unwrap().3[..4], [2, 2, 2, 2]);

        let mut options = ExportOptions::new("out");
        options.parallel = true;
        let (summary, writes) = export(&doc, options);
        assert_eq!(summary.collisions, 1);
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].3[..4], [2, 2, 2, 2]);
    }

    #[test]
    fn test_parallel_matches_sequential_on_disk() {
        let doc = MemoryDocument::new(16, 16)
            .folder("Face")
            .raster("Eye", 2, 3, 4, 4, 90)
            .raster("Mouth", 5, 9, 6, 2, 120)
            .end_folder()
            .raster("Face", 0, 0, 16, 16, 30)
            .raster("Face", 1, 1, 2, 2, 60);

        let sequential = tempfile::tempdir().unwrap();
        let parallel = tempfile::tempdir().unwrap();
        let mut options = ExportOptions::new(sequential.path());
        let seq_summary = LayerExporter::new(&doc, &PngWriter, options.clone()).export().unwrap();
        options.output_dir = parallel.path().to_path_buf();
        options.parallel = true;
        let par_summary = LayerExporter::new(&doc, &PngWriter, options).export().unwrap();

        assert_eq!(seq_summary.collisions, par_summary.collisions);
        assert_eq!(seq_summary.emitted.len(), par_summary.emitted.len());
        for rel in ["Face/Eye.png", "Face/Mouth.png", "Face.png"] {
            let a = std::fs::read(sequential.path().join(rel)).unwrap();
            let b = std::fs::read(parallel.path().join(rel)).unwrap();
            assert_eq!(a, b, "{rel}");
        }
    }

    #[test]
    fn test_export_is_idempotent() {
        let doc = scenario_b();
        let (_, first) = export(&doc, ExportOptions::new("out"));
        let (_, second) = export(&doc, ExportOptions::new("out"));
        assert_eq!(first, second);
    }

    #[test]
    fn test_plan_captures_ancestors_per_layer() {
        let doc = scenario_b();
        let writer = RecordingWriter::default();
        let exporter = LayerExporter::new(&doc, &writer, ExportOptions::new("out"));
        let (jobs, summary) = exporter.plan();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].layer.index, 1);
        assert_eq!(jobs[0].path, Path::new("out").join("Group").join("Eye.png"));
        assert_eq!(summary.emitted, vec![jobs[0].path.clone()]);
        assert!(writer.take().is_empty());
    }

    struct FailingWriter;

    impl LayerImageWriter for FailingWriter {
        fn write(&self, path: &Path, _: u32, _: u32, _: &[u8]) -> Result<()> {
            anyhow::bail!("disk full writing {}", path.display())
        }
    }

    #[test]
    fn test_canvas_buffer_survives_many_layers() {
        let mut doc = MemoryDocument::new(64, 64);
        for i in 0..8 {
            doc = doc.raster(&format!("layer{}", i), i, i, 2, 2, 200);
        }
        let writer = RecordingWriter::default();
        let exporter = LayerExporter::new(&doc, &writer, ExportOptions::new("out"));
        let summary = exporter.export().unwrap();
        assert_eq!(summary.emitted.len(), 8);

        let pooled = exporter.pool.stats().u8_buffers_available;
        assert!(pooled >= 1);
        let canvas = exporter.pool.get_u8_buffer(64 * 64 * 4);
        assert!(canvas.capacity() >= 64 * 64 * 4);
        assert_eq!(exporter.pool.stats().u8_buffers_available, pooled - 1);
    }

    #[test]
    fn test_cropped_buffers_are_not_pooled() {
        let mut options = ExportOptions::new("out");
        options.crop = true;
        let doc = MemoryDocument::new(64, 64).raster("a", 0, 0, 2, 2, 1).raster("b", 4, 4, 3, 3, 2);
        let writer = RecordingWriter::default();
        let exporter = LayerExporter::new(&doc, &writer, options);
        exporter.export().unwrap();
        assert_eq!(exporter.pool.stats().u8_buffers_available, 0);
    }

    #[test]
    fn test_write_failure_propagates() {
        let err = LayerExporter::new(&scenario_b(), &FailingWriter, ExportOptions::new("out"))
            .export()
            .unwrap_err();
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_read_failure_propagates() {
        let mut doc = scenario_b();
        doc.pixels.clear();
        let writer = RecordingWriter::default();
        let err = LayerExporter::new(&doc, &writer, ExportOptions::new("out")).export().unwrap_err();
        assert!(err.to_string().contains("Failed to read pixels of layer 'Eye'"));
    }

    #[derive(Default)]
    struct CountingProgress {
        updates: Mutex<Vec<f32>>,
    }

    impl ProgressSink for CountingProgress {
        fn start_indeterminate(&self, _message: Option<&str>) {}
        fn set(&self, progress_0_1: f32, _message: Option<&str>) {
            self.updates.lock().unwrap().push(progress_0_1);
        }
        fn finish(&self, _message: Option<&str>) {}
    }

    #[test]
    fn test_progress_reaches_completion() {
        let doc = scenario_b();
        let progress = CountingProgress::default();
        let writer = RecordingWriter::default();
        LayerExporter::new(&doc, &writer, ExportOptions::new("out"))
            .with_progress(&progress)
            .export()
            .unwrap();
        let updates = progress.updates.lock().unwrap();
        assert_eq!(updates.len(), 3);
        assert_eq!(*updates.last().unwrap(), 1.0);
    }

    #[test]
    fn test_end_to_end_from_psd_bytes() {
        use crate::io::psd_reader::testing::{Encoding, PsdBuilder, TestLayer};
        use crate::io::psd_reader::PsdDocument;

        let mut builder = PsdBuilder::new(6, 4);
        builder.encoding = Encoding::Rle;
        builder.layers.push(TestLayer::raster("Paper", 0, 0, 6, 4, [255, 255, 255, 255]));
        builder.layers.push(TestLayer::divider("</Layer group>", 3));
        builder.layers.push(TestLayer::raster("Eye", 1, 1, 2, 2, [0, 0, 255, 128]));
        builder.layers.push(TestLayer::divider("Face", 2));
        let document = PsdDocument::from_bytes(builder.build()).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let summary = LayerExporter::new(&document, &PngWriter, ExportOptions::new(dir.path()))
            .export()
            .unwrap();
        assert_eq!(summary.emitted.len(), 2);

        let eye = image::open(dir.path().join("Face").join("Eye.png")).unwrap().to_rgba8();
        assert_eq!(eye.dimensions(), (6, 4));
        assert_eq!(eye.get_pixel(1, 1).0, [0, 0, 255, 128]);
        assert_eq!(eye.get_pixel(0, 0).0, [0, 0, 0, 0]);

        let paper = image::open(dir.path().join("Paper.png")).unwrap().to_rgba8();
        assert!(paper.pixels().all(|p| p.0 == [255, 255, 255, 255]));
    }
}
