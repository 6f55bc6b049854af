//! Buffer sizing policy tests.

use movie_ingest::{
    BufferSizingPolicy, ChunkPlan, FixedMemory, FrameShape, IngestError, MemoryProbe,
    SizingRequest,
};

fn request(chunk_data: bool) -> SizingRequest {
    SizingRequest {
        file_size_bytes: 1_000_000,
        frame_count: 300,
        bytes_per_frame: 640 * 480 * 3,
        chunk_data,
        memory_budget_bytes: None,
        explicit_chunk_shape: None,
    }
}

#[test]
fn estimate_is_seventy_times_file_size() {
    assert_eq!(
        BufferSizingPolicy::new().estimate_uncompressed(1_000_000),
        70_000_000
    );
}

#[test]
fn eager_request_over_memory_is_forced_to_chunks() {
    let decision = BufferSizingPolicy::new()
        .plan(&request(false), FixedMemory(50_000_000).available_memory())
        .expect("Sizing failed");

    assert!(decision.plan.is_chunked());
    let warning = decision.warning.expect("An advisory should be raised");
    assert_eq!(warning.estimated_bytes, 70_000_000);
    assert_eq!(warning.available_bytes, 50_000_000);
    assert!(warning.to_string().contains("forcing chunked"));
}

#[test]
fn estimate_equal_to_memory_also_forces_chunks() {
    let decision = BufferSizingPolicy::new()
        .plan(&request(false), 70_000_000)
        .expect("Sizing failed");
    assert!(decision.plan.is_chunked());
    assert!(decision.warning.is_some());
}

#[test]
fn chunked_request_never_warns() {
    let decision = BufferSizingPolicy::new()
        .plan(&request(true), 1)
        .expect("Sizing failed");
    assert!(decision.warning.is_none());
    assert!(decision.plan.is_chunked());
}

#[test]
fn eager_request_that_fits_loads_everything() {
    let decision = BufferSizingPolicy::new()
        .plan(&request(false), 8_000_000_000)
        .expect("Sizing failed");
    assert_eq!(decision.plan, ChunkPlan::Eager { total_frames: 300 });
    assert_eq!(decision.plan.frames_per_chunk(), 300);
}

#[test]
fn inflation_factor_is_configurable() {
    let policy = BufferSizingPolicy::new().with_inflation_factor(20);
    let decision = policy
        .plan(&request(false), 50_000_000)
        .expect("Sizing failed");
    assert_eq!(policy.estimate_uncompressed(1_000_000), 20_000_000);
    assert!(decision.warning.is_none());
    assert!(!decision.plan.is_chunked());
}

#[test]
fn budget_is_floor_divided_by_frame_size() {
    let mut sized = request(true);
    sized.bytes_per_frame = 48;
    sized.memory_budget_bytes = Some(480);
    let decision = BufferSizingPolicy::new()
        .plan(&sized, u64::MAX)
        .expect("Sizing failed");
    assert_eq!(
        decision.plan,
        ChunkPlan::MemoryBudget {
            budget_bytes: 480,
            frames_per_chunk: 10,
        }
    );

    sized.memory_budget_bytes = Some(527);
    let decision = BufferSizingPolicy::new()
        .plan(&sized, u64::MAX)
        .expect("Sizing failed");
    assert_eq!(decision.plan.frames_per_chunk(), 10);
}

#[test]
fn budget_smaller_than_a_frame_still_holds_one_frame() {
    let mut sized = request(true);
    sized.memory_budget_bytes = Some(1);
    let decision = BufferSizingPolicy::new()
        .plan(&sized, u64::MAX)
        .expect("Sizing failed");
    assert_eq!(decision.plan.frames_per_chunk(), 1);
}

#[test]
fn default_budget_is_one_gigabyte() {
    let decision = BufferSizingPolicy::new()
        .plan(&request(true), u64::MAX)
        .expect("Sizing failed");
    assert_eq!(
        decision.plan,
        ChunkPlan::MemoryBudget {
            budget_bytes: 1_000_000_000,
            frames_per_chunk: 1_000_000_000 / 921_600,
        }
    );
}

#[test]
fn explicit_chunk_shape_is_used_verbatim() {
    let mut sized = request(false);
    sized.explicit_chunk_shape = Some(vec![7, 480, 640, 3]);
    let decision = BufferSizingPolicy::new()
        .plan(&sized, 1)
        .expect("Sizing failed");

    assert!(decision.warning.is_none());
    assert_eq!(decision.plan.frames_per_chunk(), 7);
    assert_eq!(
        decision.plan.chunk_shape(FrameShape::new(480, 640, 3)),
        vec![7, 480, 640, 3]
    );
}

#[test]
fn degenerate_chunk_shapes_are_rejected() {
    for shape in [vec![], vec![0, 480, 640, 3]] {
        let mut sized = request(true);
        sized.explicit_chunk_shape = Some(shape.clone());
        let result = BufferSizingPolicy::new().plan(&sized, u64::MAX);
        assert!(
            matches!(result, Err(IngestError::InvalidChunkShape(ref rejected)) if *rejected == shape),
            "Expected InvalidChunkShape for {shape:?}",
        );
    }
}

#[test]
fn budget_plan_chunk_shape_spans_whole_frames() {
    let plan = ChunkPlan::MemoryBudget {
        budget_bytes: 480,
        frames_per_chunk: 10,
    };
    assert_eq!(plan.chunk_shape(FrameShape::new(4, 4, 3)), vec![10, 4, 4, 3]);
}
