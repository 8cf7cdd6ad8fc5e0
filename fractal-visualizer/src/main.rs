use anyhow::{Context, Result};
use clap::Parser;
use dashmap::DashMap;
use env_logger::Builder;
use fractal_common::{FractalConfig, GenerationSnapshot, Segment};
use image::{ImageBuffer, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut, draw_polygon_mut};
use imageproc::point::Point;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn, LevelFilter};
use minimp4::Mp4Muxer;
use openh264::encoder::{BitRate, Encoder, EncoderConfig, FrameRate};
use openh264::formats::YUVBuffer;
use palette::{FromColor, Hsv, Srgb};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::fs::{self, File};
use std::io::{BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::time::Instant;

/// Command-line arguments for the visualizer
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input generations file path (.bin)
    #[arg(short, long)]
    input: PathBuf,

    /// Output video file path (.mp4)
    #[arg(short, long, default_value = "fractal_tree.mp4")]
    output: PathBuf,

    /// PNG of the finished drawing
    #[arg(long, default_value = "fractal_tree.png")]
    still: PathBuf,

    /// Optional path to the config.toml file to get the canvas size and colours
    #[arg(long)]
    config: Option<PathBuf>,

    /// Canvas width in pixels (used if config is not provided)
    #[arg(long, default_value_t = 1280)]
    width: u32,

    /// Canvas height in pixels (used if config is not provided)
    #[arg(long, default_value_t = 720)]
    height: u32,

    /// Frames per second for the output video
    #[arg(long, default_value_t = 60)]
    fps: u32,

    /// Seconds to hold the finished tree at the end of the video
    #[arg(long, default_value_t = 1.0)]
    hold_secs: f64,

    /// Stroke colour - "palette" colours branches by depth, or a colour name
    /// (black, white, red, green, blue, yellow, cyan, magenta, brown)
    #[arg(long)]
    color: Option<String>,

    /// Background colour name
    #[arg(long)]
    bg_color: Option<String>,

    /// Frames rendered in parallel and encoded before the next batch starts
    #[arg(long, default_value_t = 30)]
    batch_size: usize,

    /// Seed for the palette's saturation jitter
    #[arg(long, default_value_t = 0)]
    palette_seed: u64,
}

// Color definitions for named colors (RGBA format)
const COLOR_MAP: &[(&str, [u8; 4])] = &[
    ("black", [0, 0, 0, 255]),
    ("white", [255, 255, 255, 255]),
    ("red", [255, 0, 0, 255]),
    ("green", [0, 255, 0, 255]),
    ("blue", [0, 0, 255, 255]),
    ("yellow", [255, 255, 0, 255]),
    ("cyan", [0, 255, 255, 255]),
    ("magenta", [255, 0, 255, 255]),
    ("brown", [101, 67, 33, 255]),
];

/// How strokes are coloured.
#[derive(Debug, Clone)]
enum StrokeStyle {
    /// One colour per generation depth, bark to leaf.
    Depth(Vec<[u8; 4]>),
    Solid([u8; 4]),
}

impl StrokeStyle {
    fn color_for(&self, generation: usize) -> Rgba<u8> {
        let c = match self {
            StrokeStyle::Depth(colors) => colors[generation.min(colors.len() - 1)],
            StrokeStyle::Solid(c) => *c,
        };
        Rgba(c)
    }
}

/// Canvas geometry shared by every frame.
#[derive(Debug, Clone, Copy)]
struct Surface {
    width: u32,
    height: u32,
    /// Canvas units to pixels.
    scale: f64,
    bg_color: [u8; 4],
}

impl Surface {
    /// Canvas coordinates have y pointing up; image rows grow downwards.
    fn to_pixel(&self, (x, y): (f64, f64)) -> (f64, f64) {
        (x * self.scale, self.height as f64 - y * self.scale)
    }
}

/// Parse a color name to RGBA values
fn parse_color(color_name: &str) -> [u8; 4] {
    for &(name, color) in COLOR_MAP {
        if name.eq_ignore_ascii_case(color_name) {
            return color;
        }
    }
    // Default to black if color not found
    warn!("Color '{}' not recognized, using black.", color_name);
    [0, 0, 0, 255]
}

/// Bark brown at the trunk fading to leaf green at the tips.
fn generate_depth_palette(depths: usize, seed: u64) -> Vec<[u8; 4]> {
    let depths = depths.max(1);
    let mut rng = StdRng::seed_from_u64(seed);
    (0..depths)
        .map(|depth| {
            let t = if depths > 1 { depth as f32 / (depths - 1) as f32 } else { 0.0 };
            let hue = 25.0 + t * 95.0;
            let saturation = 0.75 + rng.random_range(-0.05..0.05);
            let value = 0.35 + t * 0.45;

            let rgb = Srgb::from_color(Hsv::new(hue, saturation, value));
            [
                (rgb.red * 255.0) as u8,
                (rgb.green * 255.0) as u8,
                (rgb.blue * 255.0) as u8,
                255,
            ]
        })
        .collect()
}

/// Draws one branch as a round-capped stroke.
fn draw_segment(image: &mut RgbaImage, surface: &Surface, segment: &Segment, color: Rgba<u8>) {
    let (x0, y0) = surface.to_pixel(segment.start);
    let (x1, y1) = surface.to_pixel(segment.end);
    let half = segment.thickness * surface.scale / 2.0;

    if half < 1.0 {
        draw_line_segment_mut(image, (x0 as f32, y0 as f32), (x1 as f32, y1 as f32), color);
        return;
    }

    let radius = half.round() as i32;
    draw_filled_circle_mut(image, (x0.round() as i32, y0.round() as i32), radius, color);
    draw_filled_circle_mut(image, (x1.round() as i32, y1.round() as i32), radius, color);

    let (dx, dy) = (x1 - x0, y1 - y0);
    let len = dx.hypot(dy);
    if len < 1e-6 {
        return;
    }
    let (nx, ny) = (-dy / len * half, dx / len * half);
    let corner = |x: f64, y: f64| Point::new(x.round() as i32, y.round() as i32);
    let quad = [
        corner(x0 + nx, y0 + ny),
        corner(x1 + nx, y1 + ny),
        corner(x1 - nx, y1 - ny),
        corner(x0 - nx, y0 - ny),
    ];
    // The quad is closed implicitly; a repeated first point would be rejected.
    if quad[0] != quad[3] {
        draw_polygon_mut(image, &quad, color);
    }
}

/// Draw the canvas as it looks once the first `visible` generations have been drawn.
fn draw_frame(snapshots: &[GenerationSnapshot], visible: usize, surface: &Surface, style: &StrokeStyle) -> RgbaImage {
    let mut image = ImageBuffer::from_pixel(surface.width, surface.height, Rgba(surface.bg_color));
    for snapshot in &snapshots[..visible] {
        let color = style.color_for(snapshot.generation);
        for segment in &snapshot.segments {
            draw_segment(&mut image, surface, segment, color);
        }
    }
    image
}

/// Number of generations visible in each video frame.
///
/// Generations appear at their recorded frame timestamps; the last one is held for `hold_frames`.
fn frame_timeline(snapshots: &[GenerationSnapshot], fps: u32, hold_frames: usize) -> Vec<usize> {
    let (Some(first), Some(last)) = (snapshots.first(), snapshots.last()) else {
        return Vec::new();
    };
    let frame_ms = 1000.0 / fps as f64;
    let t0 = first.time_ms;
    let animated_frames = ((last.time_ms - t0) / frame_ms).floor() as usize + 1;

    (0..animated_frames + hold_frames)
        .map(|i| {
            let t = t0 + i as f64 * frame_ms;
            snapshots.partition_point(|s| s.time_ms <= t)
        })
        .collect()
}

/// YUV frames for one batch of the timeline, rendered in parallel.
///
/// Each distinct visible-generation count is drawn once and kept in `cache`. Counts never
/// decrease along the timeline, so entries below the batch's first count are evicted.
fn render_batch(
    batch: &[usize],
    cache: &DashMap<usize, Vec<u8>>,
    snapshots: &[GenerationSnapshot],
    surface: &Surface,
    style: &StrokeStyle,
) -> Vec<Vec<u8>> {
    let Some(&lowest) = batch.first() else {
        return Vec::new();
    };
    cache.retain(|&visible, _| visible >= lowest);

    let mut missing: Vec<usize> = batch.iter().copied().filter(|v| !cache.contains_key(v)).collect();
    missing.dedup();
    missing.par_iter().for_each(|&visible| {
        cache.insert(visible, rgb_to_yuv420(&draw_frame(snapshots, visible, surface, style)));
    });

    batch
        .iter()
        .filter_map(|visible| cache.get(visible).map(|frame| frame.value().clone()))
        .collect()
}

/// BT.601 RGB to planar YUV 4:2:0. Both dimensions must be even.
fn rgb_to_yuv420(image: &RgbaImage) -> Vec<u8> {
    let (width, height) = (image.width(), image.height());
    let luma_len = (width * height) as usize;
    let chroma_len = luma_len / 4;
    let mut yuv = Vec::with_capacity(luma_len + 2 * chroma_len);

    yuv.extend(image.pixels().map(|p| {
        let [r, g, b, _] = p.0.map(f32::from);
        (0.299 * r + 0.587 * g + 0.114 * b).round() as u8
    }));

    // Chroma is subsampled: one U and one V per 2x2 block, averaged.
    let mut v_plane = Vec::with_capacity(chroma_len);
    for by in (0..height).step_by(2) {
        for bx in (0..width).step_by(2) {
            let (mut u, mut v) = (0f32, 0f32);
            for (x, y) in [(bx, by), (bx + 1, by), (bx, by + 1), (bx + 1, by + 1)] {
                let [r, g, b, _] = image.get_pixel(x, y).0.map(f32::from);
                u += -0.169 * r - 0.331 * g + 0.5 * b + 128.0;
                v += 0.5 * r - 0.419 * g - 0.081 * b + 128.0;
            }
            yuv.push((u / 4.0).round() as u8);
            v_plane.push((v / 4.0).round() as u8);
        }
    }
    yuv.extend(v_plane);
    yuv
}

/// Reads the `u32` count header followed by that many generations.
fn read_snapshots<R: Read>(reader: &mut R) -> Result<Vec<GenerationSnapshot>> {
    let count: u32 = bincode::deserialize_from(&mut *reader).context("Failed to read generation count from header")?;
    let mut snapshots = Vec::with_capacity(count as usize);
    for i in 0..count {
        let snapshot: GenerationSnapshot =
            bincode::deserialize_from(&mut *reader).with_context(|| format!("Failed to read generation {}", i))?;
        snapshots.push(snapshot);
    }
    Ok(snapshots)
}

fn progress_bar(len: u64, template: &str) -> Result<ProgressBar> {
    let bar = ProgressBar::new(len);
    bar.set_style(ProgressStyle::default_bar().template(template)?.progress_chars("#>-"));
    Ok(bar)
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logger
    Builder::from_default_env().filter(None, LevelFilter::Info).init();

    run_with_args(args)
}

fn run_with_args(args: Args) -> Result<()> {
    info!("Starting Fractal Tree Visualizer...");
    info!("Input file: {}", args.input.display());
    info!("Output video: {}", args.output.display());

    // --- Determine Canvas Dimensions and Colours ---
    let (canvas_width, canvas_height, config_bg, config_stroke) = match &args.config {
        Some(config_path) => match FractalConfig::load(config_path) {
            Ok(config) => {
                info!("Loaded canvas settings from {}", config_path.display());
                (config.canvas.width, config.canvas.height, Some(config.canvas.background), Some(config.canvas.stroke))
            }
            Err(e) => {
                warn!(
                    "Failed to load config file '{}': {}. Using provided dimensions.",
                    config_path.display(),
                    e
                );
                (args.width, args.height, None, None)
            }
        },
        None => {
            info!("Using provided canvas dimensions.");
            (args.width, args.height, None, None)
        }
    };
    if canvas_width == 0 || canvas_height == 0 {
        anyhow::bail!("no drawing surface: canvas is {}x{}", canvas_width, canvas_height);
    }

    // H.264 with 4:2:0 chroma needs even dimensions.
    let surface = Surface {
        width: canvas_width & !1,
        height: canvas_height & !1,
        scale: 1.0,
        bg_color: parse_color(args.bg_color.as_deref().or(config_bg.as_deref()).unwrap_or("white")),
    };
    info!("Output video dimensions: {}x{} px at {} fps", surface.width, surface.height, args.fps);

    // --- Open and Parse Generations File ---
    let input_file = File::open(&args.input)
        .with_context(|| format!("Failed to open input file: {}", args.input.display()))?;
    let snapshots = read_snapshots(&mut BufReader::new(input_file))?;
    info!("Found {} generations in the file", snapshots.len());
    if snapshots.is_empty() {
        warn!("Input file contains no generations. Exiting.");
        return Ok(());
    }

    let max_generation = snapshots.iter().map(|s| s.generation).max().unwrap_or(0);
    let stroke = args.color.as_deref().or(config_stroke.as_deref()).unwrap_or("palette");
    let style = if stroke.eq_ignore_ascii_case("palette") {
        info!("Colouring branches by depth ({} levels)", max_generation + 1);
        StrokeStyle::Depth(generate_depth_palette(max_generation + 1, args.palette_seed))
    } else {
        let color = parse_color(stroke);
        info!("Using single colour for all branches: {:?}", color);
        StrokeStyle::Solid(color)
    };

    let hold_frames = (args.hold_secs.max(0.0) * args.fps as f64).round() as usize;
    let timeline = frame_timeline(&snapshots, args.fps.max(1), hold_frames);
    info!("Rendering {} video frames...", timeline.len());

    let start_time = Instant::now();
    let finished = draw_frame(&snapshots, snapshots.len(), &surface, &style);
    finished
        .save(&args.still)
        .with_context(|| format!("Failed to write still image to {}", args.still.display()))?;
    info!("Finished drawing saved to {}", args.still.display());

    // --- Render and Encode Frames Batch by Batch ---
    let mut encoder = Encoder::with_api_config(
        openh264::OpenH264API::from_source(),
        EncoderConfig::new()
            .max_frame_rate(FrameRate::from_hz(args.fps as f32))
            .bitrate(BitRate::from_bps(5_000_000)),
    )
    .context("Failed to initialize H.264 encoder")?;

    let progress = progress_bar(
        timeline.len() as u64,
        "[{elapsed_precise}] [{bar:40.green/blue}] {pos}/{len} encoded ({percent}%) [{eta}]",
    )?;
    let cache = DashMap::new();
    let mut h264_data = Vec::new();
    let mut frame_count = 0usize;

    for batch in timeline.chunks(args.batch_size.max(1)) {
        // Encode sequentially to keep frame order
        for yuv_data in render_batch(batch, &cache, &snapshots, &surface, &style) {
            let yuv_source = YUVBuffer::from_vec(yuv_data, surface.width as usize, surface.height as usize);
            let bitstream = encoder
                .encode(&yuv_source)
                .with_context(|| format!("Failed to encode frame {}", frame_count))?;
            bitstream.write_vec(&mut h264_data);
            frame_count += 1;
            progress.inc(1);
        }
    }
    progress.finish_with_message(format!("Encoded {} frames", frame_count));

    // --- Mux into MP4 ---
    info!("Creating MP4 file...");
    let mut video_buffer = Cursor::new(Vec::new());
    {
        let mut mp4muxer = Mp4Muxer::new(&mut video_buffer);
        let description = format!("Fractal tree - {} generations", snapshots.len());
        mp4muxer.init_video(surface.width as i32, surface.height as i32, false, &description);
        mp4muxer.write_video(&h264_data);
        mp4muxer.close();
    }

    video_buffer.seek(SeekFrom::Start(0))?;
    let mut video_bytes = Vec::new();
    video_buffer.read_to_end(&mut video_bytes)?;
    fs::write(&args.output, &video_bytes)
        .with_context(|| format!("Failed to write video file to {}", args.output.display()))?;

    let duration = start_time.elapsed();
    info!(
        "Video generation completed in {:.2?} ({:.1} frames per second)",
        duration,
        frame_count as f64 / duration.as_secs_f64()
    );
    info!("Output saved to: {}", args.output.display());

    Ok(())
}
