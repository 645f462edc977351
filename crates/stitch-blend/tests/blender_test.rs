//! End-to-end tests of the pyramid blender on the CPU reference engine.

use std::sync::Arc;

use approx::assert_abs_diff_eq;
use stitch_blend::{
    create_pyramid_blender, reference_engine, BlendError, BlenderConfig, BlenderState, ErrorKind,
    Plane, PyramidAllocator, PyramidBlender, PyramidImages,
};
use stitch_compute::CpuEngine;
use stitch_core::{HostAllocator, ImageView, Rect, VideoBuffer, VideoBufferInfo, VideoFormat};

const Y_PLANE: usize = 0;
const UV_PLANE: usize = 1;

fn frame(alloc: &HostAllocator, width: u32, height: u32, y: u8, uv: u8) -> VideoBuffer {
    let info = VideoBufferInfo::init(VideoFormat::Nv12, width, height, 0, 0).unwrap();
    let buf = VideoBuffer::allocate(alloc, info).unwrap();
    buf.fill_plane(Y_PLANE, y).unwrap();
    buf.fill_plane(UV_PLANE, uv).unwrap();
    buf
}

/// First input with the second one attached.
fn pair(alloc: &HostAllocator, width: u32, height: u32, a: (u8, u8), b: (u8, u8)) -> VideoBuffer {
    let first = frame(alloc, width, height, a.0, a.1);
    let second = frame(alloc, width, height, b.0, b.1);
    first.attach_buffer(Arc::new(second));
    first
}

fn blender(levels: usize, need_uv: bool) -> (Arc<HostAllocator>, PyramidBlender<CpuEngine>) {
    let alloc = Arc::new(HostAllocator::new(256 << 20));
    let b = create_pyramid_blender(
        Arc::new(reference_engine()),
        alloc.clone(),
        BlenderConfig::new(levels, need_uv),
    )
    .unwrap();
    (alloc, b)
}

fn row(plane: &[u8], stride: usize, y: usize) -> &[u8] {
    &plane[y * stride..(y + 1) * stride]
}

fn bound(view: &Option<ImageView>) -> &ImageView {
    view.as_ref().expect("frame views bound")
}

/// Frame with a deterministic non-flat pattern in both planes.
fn textured(alloc: &HostAllocator, width: u32, height: u32, seed: usize) -> VideoBuffer {
    let info = VideoBufferInfo::init(VideoFormat::Nv12, width, height, 0, 0).unwrap();
    let buf = VideoBuffer::allocate(alloc, info).unwrap();
    let (w, h) = (width as usize, height as usize);
    let pattern = |rows: usize| -> Vec<u8> {
        (0..rows * w)
            .map(|i| {
                let (x, y) = (i % w, i / w);
                ((x * 37 + y * 91 + seed * 53) ^ (x / 3)) as u8
            })
            .collect()
    };
    buf.write_plane(Y_PLANE, &pattern(h)).unwrap();
    buf.write_plane(UV_PLANE, &pattern(h / 2)).unwrap();
    buf
}

#[test]
fn test_hd_pair_geometry() {
    let alloc = HostAllocator::new(256 << 20);
    let input = pair(&alloc, 1280, 960, (0, 128), (0, 128));
    let companion = input.find_attached().unwrap();
    let output = frame(&alloc, 1920, 960, 0, 0);

    let layers = PyramidAllocator::new(&alloc, 2, true)
        .allocate(&input, &companion, &output, &[])
        .unwrap();
    assert_eq!(layers.len(), 2);

    let l0 = layers.get(0).unwrap();
    assert_eq!(l0.merge_window, Rect::new(640, 0, 320, 960));

    let l1 = layers.get(1).unwrap();
    assert_eq!(l1.width, [640, 640]);
    assert_eq!(l1.height, [480, 480]);
    assert_eq!((l1.blend_width, l1.blend_height), (960, 480));
    assert_eq!(l1.merge_window.x % 8, 0);
    assert_eq!(l1.merge_window.width % 8, 0);
    assert_eq!(l1.merge_window, Rect::new(320, 0, 160, 480));

    assert!(l1.has_chroma());
    for plane in [Plane::Luma, Plane::Chroma] {
        let p = l1.plane(plane).unwrap();
        assert!(bound(&p.lap[0]).shares_buffer(bound(&p.gauss[0])));
        assert!(bound(&p.lap[1]).shares_buffer(bound(&p.gauss[1])));
        assert!(bound(&p.blend).shares_buffer(bound(&p.reconstruct)));
    }
    let luma = l1.plane(Plane::Luma).unwrap();
    assert_eq!(bound(&luma.gauss[0]).width(), 640 / 8);
    assert_eq!(bound(&luma.gauss[0]).height(), 480);
    assert_eq!(bound(&l1.plane(Plane::Chroma).unwrap().gauss[0]).height(), 240);

    // level 0 views alias the frames themselves
    let l0_luma = l0.plane(Plane::Luma).unwrap();
    assert!(Arc::ptr_eq(bound(&l0_luma.gauss[0]).buffer(), input.buffer()));
    assert!(Arc::ptr_eq(bound(&l0_luma.reconstruct).buffer(), output.buffer()));
}

#[test]
fn test_level_counts_and_halving() {
    let alloc = HostAllocator::new(64 << 20);
    let input = pair(&alloc, 96, 40, (0, 0), (0, 0));
    let companion = input.find_attached().unwrap();
    let output = frame(&alloc, 144, 40, 0, 0);

    for levels in 1..=4 {
        let pa = PyramidAllocator::new(&alloc, levels, true);
        let first = pa.allocate(&input, &companion, &output, &[]).unwrap();
        assert_eq!(first.len(), levels);

        for (level, (prev, next)) in first.iter().zip(first.iter().skip(1)).enumerate() {
            assert_eq!(next.width[0], prev.width[0].div_ceil(2), "level {}", level + 1);
            assert_eq!(next.height[0], prev.height[0].div_ceil(2));
            assert_eq!(next.blend_width, prev.blend_width.div_ceil(2));
        }

        // the coarsest level has no storage of its own for lap and blend
        let coarsest = first.last().unwrap();
        for plane in [Plane::Luma, Plane::Chroma] {
            let p = coarsest.plane(plane).unwrap();
            for slot in 0..2 {
                assert!(
                    bound(&p.lap[slot]).shares_buffer(bound(&p.gauss[slot])),
                    "{} levels, {:?} slot {}",
                    levels,
                    plane,
                    slot
                );
            }
            assert!(bound(&p.blend).shares_buffer(bound(&p.reconstruct)));
        }

        let second = pa.allocate(&input, &companion, &output, &[]).unwrap();
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.merge_window, b.merge_window);
            assert_eq!((a.width, a.blend_width), (b.width, b.blend_width));
        }
    }

    let deepest = PyramidAllocator::new(&alloc, 9, true)
        .allocate(&input, &companion, &output, &[])
        .unwrap();
    assert_eq!(deepest.len(), 4);
    let last = deepest.last().unwrap();
    assert_eq!((last.width[0], last.height[0], last.blend_width), (12, 5, 18));
}

#[test]
fn test_flat_inputs_round_trip() {
    const A: (u8, u8) = (40, 100);
    const B: (u8, u8) = (200, 150);
    let (alloc, mut blender) = blender(4, true);
    blender.set_output_size(960, 32).unwrap();

    let input = pair(&alloc, 640, 32, A, B);
    let output = blender.execute(&input).unwrap();
    assert_eq!(blender.state(), BlenderState::Ready);
    assert_eq!(blender.merge_window(0), Some(Rect::new(320, 0, 160, 32)));
    assert_eq!(blender.merge_window(3), Some(Rect::new(40, 0, 16, 4)));

    let luma = output.read_plane(Y_PLANE).unwrap();
    let luma_stride = luma.len() / 32;
    for y in 0..32 {
        let line = row(&luma, luma_stride, y);
        assert!(line[..320].iter().all(|&v| v == A.0), "row {} left of seam", y);
        assert!(line[480..960].iter().all(|&v| v == B.0), "row {} right of seam", y);
        for x in 320..480 {
            assert!(line[x] <= line[x + 1], "row {} not monotonic at {}", y, x);
        }
    }

    let chroma = output.read_plane(UV_PLANE).unwrap();
    let chroma_stride = chroma.len() / 16;
    for y in 0..16 {
        let line = row(&chroma, chroma_stride, y);
        assert!(line[..320].iter().all(|&v| v == A.1));
        assert!(line[480..960].iter().all(|&v| v == B.1));
    }
}

#[test]
fn test_textured_inputs_round_trip() {
    let (alloc, mut blender) = blender(4, true);
    blender.set_output_size(960, 32).unwrap();

    let input = textured(&alloc, 640, 32, 1);
    let companion = textured(&alloc, 640, 32, 2);
    let (in0_y, in0_uv) = (input.read_plane(Y_PLANE).unwrap(), input.read_plane(UV_PLANE).unwrap());
    let (in1_y, in1_uv) = (companion.read_plane(Y_PLANE).unwrap(), companion.read_plane(UV_PLANE).unwrap());
    input.attach_buffer(Arc::new(companion));

    let output = blender.execute(&input).unwrap();
    let window = blender.merge_window(0).unwrap();
    assert_eq!(window, Rect::new(320, 0, 160, 32));

    // input 1 starts at output column 960 - 640
    let offset = 320;
    for (out, a, b, rows) in [
        (output.read_plane(Y_PLANE).unwrap(), &in0_y, &in1_y, 32),
        (output.read_plane(UV_PLANE).unwrap(), &in0_uv, &in1_uv, 16),
    ] {
        for y in 0..rows {
            let (line, left, right) = (row(&out, 960, y), row(a, 640, y), row(b, 640, y));
            assert_eq!(line[..320], left[..320], "row {} left of seam", y);
            assert_eq!(line[480..], right[480 - offset..], "row {} right of seam", y);
        }
    }
}

#[test]
fn test_single_level_cross_fade() {
    let (alloc, mut blender) = blender(1, false);
    blender.set_output_size(960, 16).unwrap();
    let input = pair(&alloc, 640, 16, (40, 128), (200, 128));
    let output = blender.execute(&input).unwrap();

    let window = blender.merge_window(0).unwrap();
    assert_eq!((window.x, window.width), (320, 160));
    assert_eq!(blender.graph().len(), 1);

    let luma = output.read_plane(Y_PLANE).unwrap();
    let line = row(&luma, 960, 7);
    for (x, &v) in line.iter().enumerate() {
        let expected = if x < 320 {
            40.0
        } else if x >= 480 {
            200.0
        } else {
            let alpha = (x - 320) as f64 / 160.0;
            40.0 * (1.0 - alpha) + 200.0 * alpha
        };
        assert_abs_diff_eq!(f64::from(v), expected, epsilon = 0.5);
    }

    // chroma untouched with need_uv off
    assert!(output.read_plane(UV_PLANE).unwrap().iter().all(|&v| v == 0));
}

#[test]
fn test_missing_attachment() {
    let (alloc, mut blender) = blender(2, true);
    blender.set_output_size(96, 16).unwrap();
    let lonely = frame(&alloc, 64, 16, 0, 0);
    let output = frame(&alloc, 96, 16, 0, 0);

    let err = blender.process(&lonely, &output).unwrap_err();
    assert!(matches!(err, BlendError::MissingAttachment));
    assert_eq!(err.kind(), ErrorKind::Parameter);
    assert_eq!(blender.state(), BlenderState::Unconfigured);
}

#[test]
fn test_not_ready_without_output_size() {
    let (alloc, mut blender) = blender(2, true);
    let input = pair(&alloc, 64, 16, (0, 0), (0, 0));
    let output = frame(&alloc, 96, 16, 0, 0);

    assert_eq!(blender.process(&input, &output).unwrap_err().kind(), ErrorKind::NotReady);
    assert_eq!(
        blender
            .prepare_buffer_pool_video_info(input.video_info())
            .unwrap_err()
            .kind(),
        ErrorKind::NotReady
    );
    assert_eq!(blender.set_output_size(0, 16).unwrap_err().kind(), ErrorKind::Parameter);
}

#[test]
fn test_pool_video_info() {
    let (alloc, mut blender) = blender(1, true);
    blender.set_output_size(1900, 1080).unwrap();
    let input = frame(&alloc, 1280, 1080, 0, 0);

    let info = blender.prepare_buffer_pool_video_info(input.video_info()).unwrap();
    assert_eq!(info.format, VideoFormat::Nv12);
    assert_eq!((info.width, info.height), (1900, 1080));
    assert_eq!((info.aligned_width, info.aligned_height), (1904, 1088));
}

#[test]
fn test_output_size_mismatch() {
    let (alloc, mut blender) = blender(1, true);
    blender.set_output_size(96, 16).unwrap();
    let input = pair(&alloc, 64, 16, (0, 0), (0, 0));
    let output = frame(&alloc, 128, 16, 0, 0);

    let err = blender.process(&input, &output).unwrap_err();
    assert!(matches!(err, BlendError::Geometry(_)));
}

#[test]
fn test_allocation_failure_unconfigures() {
    let frames = HostAllocator::new(64 << 20);
    let tight = Arc::new(HostAllocator::new(64 * 1024));
    let mut blender = create_pyramid_blender(
        Arc::new(reference_engine()),
        tight.clone(),
        BlenderConfig::new(4, true),
    )
    .unwrap();
    blender.set_output_size(960, 64).unwrap();

    let input = pair(&frames, 640, 64, (0, 0), (0, 0));
    let output = frame(&frames, 960, 64, 0, 0);
    let err = blender.process(&input, &output).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Memory);
    assert_eq!(blender.state(), BlenderState::Unconfigured);
    assert!(blender.layers().is_none());
    assert_eq!(tight.in_use(), 0);
}

#[test]
fn test_merge_window_override() {
    let (alloc, mut blender) = blender(2, true);
    blender.set_output_size(96, 16).unwrap();

    assert!(matches!(
        blender.set_merge_window(Rect::new(0, 0, 8, 0), 2),
        Err(BlendError::InvalidLevel { level: 2, levels: 2 })
    ));

    // stored before allocation, applied on the first frame
    blender.set_merge_window(Rect::new(8, 0, 32, 0), 1).unwrap();
    assert!(blender.has_merge_window(1));

    let input = pair(&alloc, 64, 16, (10, 128), (90, 128));
    blender.execute(&input).unwrap();
    assert_eq!(blender.merge_window(1), Some(Rect::new(8, 0, 32, 8)));
    assert_eq!(blender.merge_window(0), Some(Rect::new(32, 0, 16, 16)));

    // out of range once the level width is known
    let err = blender.set_merge_window(Rect::new(40, 0, 16, 0), 1).unwrap_err();
    assert!(matches!(err, BlendError::InvalidMergeWindow { level: 1, .. }));
    assert_eq!(err.kind(), ErrorKind::Parameter);
    assert_eq!(blender.merge_window(1), Some(Rect::new(8, 0, 32, 8)));

    // a zero-width window restores the computed seam
    blender.set_merge_window(Rect::new(8, 0, 0, 0), 1).unwrap();
    assert_eq!(blender.merge_window(1), Some(Rect::new(16, 0, 8, 8)));
    blender.execute(&input).unwrap();
    assert_eq!(blender.merge_window(1), Some(Rect::new(16, 0, 8, 8)));
}

#[test]
fn test_zero_width_window_before_allocation() {
    let (alloc, mut blender) = blender(2, true);
    blender.set_output_size(96, 16).unwrap();

    blender.set_merge_window(Rect::new(40, 0, 0, 0), 0).unwrap();
    assert!(!blender.has_merge_window(0));

    blender.execute(&pair(&alloc, 64, 16, (0, 128), (0, 128))).unwrap();
    assert!(blender.has_merge_window(0));
    assert_eq!(blender.merge_window(0), Some(Rect::new(32, 0, 16, 16)));
}

#[test]
fn test_frames_rebind_without_realloc() {
    let (alloc, mut blender) = blender(2, true);
    blender.set_output_size(96, 16).unwrap();

    let first = pair(&alloc, 64, 16, (10, 128), (10, 128));
    let out1 = blender.execute(&first).unwrap();
    let level1 = bound(&blender.layer(1).unwrap().plane(Plane::Luma).unwrap().gauss[0]).buffer().id();
    assert!(out1.read_plane(Y_PLANE).unwrap().iter().all(|&v| v == 10));

    let second = pair(&alloc, 64, 16, (70, 128), (70, 128));
    let out2 = blender.execute(&second).unwrap();
    assert_eq!(blender.state(), BlenderState::Ready);
    assert_eq!(
        bound(&blender.layer(1).unwrap().plane(Plane::Luma).unwrap().gauss[0]).buffer().id(),
        level1
    );
    // level-0 views are released once the frame is done
    assert!(blender.gauss_image(0, Plane::Luma, 0).is_none());
    assert!(blender.reconstruct_image(0, Plane::Luma).is_none());
    assert!(blender.gauss_image(1, Plane::Luma, 0).is_some());
    assert_eq!(Arc::strong_count(second.buffer()), 1);
    assert_eq!(Arc::strong_count(out2.buffer()), 2);
    assert!(out2.read_plane(Y_PLANE).unwrap().iter().all(|&v| v == 70));
    // the first result stays intact while held
    assert!(out1.read_plane(Y_PLANE).unwrap().iter().all(|&v| v == 10));
}

#[test]
fn test_single_buffer_pool_recycles() {
    let alloc = Arc::new(HostAllocator::new(64 << 20));
    let mut blender = create_pyramid_blender(
        Arc::new(reference_engine()),
        alloc.clone(),
        BlenderConfig::new(2, true).with_pool_size(1),
    )
    .unwrap();
    blender.set_output_size(96, 16).unwrap();
    let input = pair(&alloc, 64, 16, (30, 128), (30, 128));

    let first = blender.execute(&input).unwrap();
    assert_eq!(blender.pool().len(), 1);
    // held by the caller: the only buffer is busy
    let busy = blender.execute(&input).unwrap_err();
    assert!(matches!(busy, BlendError::Core(stitch_core::Error::PoolUnavailable(_))));
    assert_eq!(busy.kind(), ErrorKind::Memory);
    drop(first);

    for _ in 0..3 {
        let out = blender.execute(&input).unwrap();
        assert!(out.read_plane(Y_PLANE).unwrap().iter().all(|&v| v == 30));
    }
    assert_eq!(blender.pool().len(), 1);
    assert_eq!(blender.state(), BlenderState::Ready);
}

#[test]
fn test_output_size_change_reallocates() {
    let (alloc, mut blender) = blender(2, false);
    blender.set_output_size(96, 16).unwrap();
    blender.execute(&pair(&alloc, 64, 16, (0, 0), (0, 0))).unwrap();
    assert_eq!(blender.state(), BlenderState::Ready);

    blender.set_output_size(112, 16).unwrap();
    assert_eq!(blender.state(), BlenderState::Unconfigured);
    assert!(blender.layers().is_none());

    let out = blender.execute(&pair(&alloc, 64, 16, (0, 0), (0, 0))).unwrap();
    assert_eq!(out.video_info().width, 112);
    assert_eq!(blender.layer(0).unwrap().blend_width, 112);
}

#[test]
fn test_pre_stop_rejects_frames() {
    let (alloc, mut blender) = blender(1, true);
    blender.set_output_size(96, 16).unwrap();
    let input = pair(&alloc, 64, 16, (0, 0), (0, 0));
    drop(blender.execute(&input).unwrap());

    blender.pre_stop();
    assert!(blender.pool().is_stopped());
    assert!(blender.execute(&input).is_err());
}
