use division_engine::backend::headless::HeadlessBackend;
use division_engine::resources::UniformBufferDescriptor;
use division_engine::{
    AttributeDescriptor, AttributeType, Context, ShaderStage, Topology, VertexLayout, VertexObject,
};
use rstest::rstest;

fn ctx() -> Context<HeadlessBackend> {
    Context::new(HeadlessBackend::new())
}

fn floats(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

// ── layout ─────────────────────────────────────────────────────────────────

#[rstest]
#[case(&[AttributeType::Float])]
#[case(&[AttributeType::Vec3, AttributeType::Vec4])]
#[case(&[AttributeType::Double, AttributeType::Integer, AttributeType::Vec2])]
#[case(&[AttributeType::Mat4x4, AttributeType::Float, AttributeType::Vec3])]
fn attributes_pack_in_declaration_order(#[case] types: &[AttributeType]) {
    let mut location = 0;
    let descriptors: Vec<_> = types
        .iter()
        .map(|&ty| {
            let d = AttributeDescriptor::new(ty, location);
            location += ty.location_span();
            d
        })
        .collect();

    let mut ctx = ctx();
    let id = ctx.vertex_buffer_alloc(&descriptors, 4, Topology::Triangles).unwrap();
    let vb = ctx.vertex_buffer(id).unwrap();

    let mut expected_offset = 0;
    for (attr, &ty) in vb.attributes().iter().zip(types) {
        assert_eq!(attr.ty, ty);
        assert_eq!(attr.offset, expected_offset);
        expected_offset += attr.width();
    }
    assert_eq!(vb.stride(), expected_offset);
    assert_eq!(VertexLayout::new(&descriptors).stride(), expected_offset);
}

#[rstest]
#[case(1)]
#[case(3)]
#[case(1024)]
fn new_buffer_has_one_object_spanning_capacity(#[case] capacity: u32) {
    let mut ctx = ctx();
    let id = ctx
        .vertex_buffer_alloc(&[AttributeDescriptor::new(AttributeType::Vec2, 0)], capacity, Topology::Points)
        .unwrap();

    let vb = ctx.vertex_buffer(id).unwrap();
    assert_eq!(vb.objects(), &[VertexObject::new(0, capacity)]);
    assert_eq!(vb.starts(), &[0]);
    assert_eq!(vb.counts(), &[capacity]);
}

// ── writes ─────────────────────────────────────────────────────────────────

#[test]
fn position_and_color_scenario() {
    let mut ctx = ctx();
    let id = ctx
        .vertex_buffer_alloc(
            &[
                AttributeDescriptor::new(AttributeType::Vec3, 0),
                AttributeDescriptor::new(AttributeType::Vec4, 1),
            ],
            3,
            Topology::Triangles,
        )
        .unwrap();

    {
        let vb = ctx.vertex_buffer(id).unwrap();
        assert_eq!(vb.stride(), 28);
        assert_eq!(vb.attributes()[0].offset, 0);
        assert_eq!(vb.attributes()[1].offset, 12);
    }

    let positions = [[-0.5f32, -0.5, 0.0], [-1.0, 0.0, 0.0], [1.0, 1.0, 0.0]];
    let colors = [[1.0f32, 1.0, 1.0, 1.0]; 3];
    assert_eq!(ctx.vertex_buffer_write_values(id, 0, 0, &positions, 0).unwrap(), 3);
    assert_eq!(ctx.vertex_buffer_write_values(id, 0, 1, &colors, 0).unwrap(), 3);

    let dump = floats(ctx.vertex_buffer(id).unwrap().contents());
    assert_eq!(dump.len(), 21);
    assert_eq!(dump[0..7], [-0.5, -0.5, 0.0, 1.0, 1.0, 1.0, 1.0]);
    assert_eq!(dump[7..14], [-1.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0]);
    assert_eq!(dump[14..21], [1.0, 1.0, 0.0, 1.0, 1.0, 1.0, 1.0]);
}

#[test]
fn rewriting_same_data_is_idempotent() {
    let mut ctx = ctx();
    let id = ctx
        .vertex_buffer_alloc(
            &[
                AttributeDescriptor::new(AttributeType::Vec2, 0),
                AttributeDescriptor::new(AttributeType::Float, 1),
            ],
            4,
            Topology::Triangles,
        )
        .unwrap();

    let uvs = [[0.0f32, 1.0], [1.0, 1.0], [1.0, 0.0]];
    ctx.vertex_buffer_write_values(id, 0, 0, &uvs, 1).unwrap();
    let first = ctx.vertex_buffer(id).unwrap().contents().to_vec();

    ctx.vertex_buffer_write_values(id, 0, 0, &uvs, 1).unwrap();
    assert_eq!(ctx.vertex_buffer(id).unwrap().contents(), first.as_slice());
}

#[test]
fn write_is_clamped_to_the_object() {
    let mut ctx = ctx();
    let id = ctx
        .vertex_buffer_alloc(&[AttributeDescriptor::new(AttributeType::Float, 0)], 6, Topology::Points)
        .unwrap();
    ctx.vertex_buffer_set_objects(id, &[VertexObject::new(0, 4), VertexObject::new(4, 2)])
        .unwrap();

    let written = ctx
        .vertex_buffer_write_values(id, 1, 0, &[7.0f32, 7.0, 7.0, 7.0, 7.0], 0)
        .unwrap();
    assert_eq!(written, 2);
    assert_eq!(floats(ctx.vertex_buffer(id).unwrap().contents()), vec![0.0, 0.0, 0.0, 0.0, 7.0, 7.0]);

    // Starting past the object writes nothing.
    let written = ctx.vertex_buffer_write_values(id, 1, 0, &[9.0f32], 2).unwrap();
    assert_eq!(written, 0);
}

#[test]
fn borrowed_bytes_survive_return() {
    let mut ctx = ctx();
    let id = ctx
        .vertex_buffer_alloc(&[AttributeDescriptor::new(AttributeType::Vec4, 0)], 2, Topology::Lines)
        .unwrap();

    let payload: Vec<u8> = (0u8..20).collect();
    {
        let mut data = ctx.vertex_buffer_borrow(id).unwrap();
        data[4..24].copy_from_slice(&payload);
    }

    let data = ctx.vertex_buffer_borrow(id).unwrap();
    assert_eq!(&data[4..24], payload.as_slice());
    assert_eq!(data.modified(), None);
}

#[test]
fn borrow_reports_written_range_on_return() {
    let mut ctx = ctx();
    let id = ctx
        .vertex_buffer_alloc(&[AttributeDescriptor::new(AttributeType::Vec4, 0)], 2, Topology::Lines)
        .unwrap();
    let buffer = ctx.vertex_buffer(id).unwrap().platform().id();
    ctx.backend_mut().take_uploads();

    {
        let mut data = ctx.vertex_buffer_borrow(id).unwrap();
        data.write(16, &[1; 8]).unwrap();
    }
    let uploads = ctx.backend_mut().take_uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].buffer, buffer);
    assert_eq!(uploads[0].range, 16..24);
}

// ── uniforms ───────────────────────────────────────────────────────────────

#[test]
fn fragment_uniform_scenario() {
    let mut ctx = ctx();
    let id = ctx
        .uniform_buffer_alloc(UniformBufferDescriptor::new(16, 1, ShaderStage::Fragment))
        .unwrap();

    let green = [0.0f32, 1.0, 0.0, 1.0];
    {
        let mut data = ctx.uniform_buffer_borrow(id).unwrap();
        data.copy_from_slice(bytemuck::bytes_of(&green));
    }

    let ub = ctx.uniform_buffer(id).unwrap();
    assert_eq!(ub.binding(), 1);
    assert_eq!(ub.stage(), ShaderStage::Fragment);
    assert_eq!(floats(ub.contents()), green.to_vec());

    // An untouched borrow leaves the bytes resident.
    ctx.uniform_buffer_borrow(id).unwrap().finish();
    assert_eq!(floats(ctx.uniform_buffer(id).unwrap().contents()), green.to_vec());
}

#[rstest]
#[case(-1)]
#[case(7)]
fn unknown_attribute_code_is_a_configuration_error(#[case] code: i32) {
    let err = AttributeType::try_from(code).unwrap_err();
    assert_eq!(err.kind(), division_engine::ErrorKind::Configuration);
}
