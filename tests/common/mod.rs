//! Shared fixtures for the integration tests: a host-backed server and a
//! structural checker for the batch partition and its GPU mirrors.
#![allow(dead_code)]

use std::rc::Rc;

use glam::Vec3;
use indirect_batcher::renderer::{
    cube_mesh, plane_mesh, sphere_mesh, BatchState, DrawIndexedIndirect, ObjectData,
};
use indirect_batcher::{
    HostDevice, Material, MaterialRef, MeshRef, RenderServer, ServerSettings, ShaderHandle,
};

pub const S1: ShaderHandle = ShaderHandle(1);
pub const S2: ShaderHandle = ShaderHandle(2);

pub fn server() -> RenderServer<HostDevice> {
    RenderServer::new(HostDevice::new(), ServerSettings::default()).unwrap()
}

/// Tiny capacities so that every arena grows during a test.
pub fn cramped_server() -> RenderServer<HostDevice> {
    let settings = ServerSettings {
        vertex_capacity: 8,
        index_capacity: 8,
        object_capacity: 2,
        material_capacity: 1,
        draw_capacity: 1,
    };
    RenderServer::new(HostDevice::new(), settings).unwrap()
}

pub fn meshes() -> Vec<MeshRef> {
    vec![
        Rc::new(cube_mesh()),
        Rc::new(plane_mesh(2.0)),
        Rc::new(sphere_mesh(8, 6)),
        Rc::new(cube_mesh()),
    ]
}

pub fn materials() -> Vec<MaterialRef> {
    vec![
        Material::unlit(S1, Vec3::X).into_shared(),
        Material::lambert(S1, Vec3::Y).into_shared(),
        Material::unlit(S2, Vec3::Z).into_shared(),
    ]
}

/// Checks the three-level partition, its ordering and that the indirect,
/// handle and object buffers agree with it on the device side.
pub fn assert_consistent(server: &RenderServer<HostDevice>) {
    let batches = server.batches();
    let objects = batches.object_batches();
    let draws = batches.draw_batches();
    let shaders = batches.shader_batches();

    assert!(
        objects.windows(2).all(|w| w[0] < w[1]),
        "object batches not strictly sorted"
    );

    let mut next = 0u32;
    for (i, draw) in draws.iter().enumerate() {
        assert_eq!(draw.first_instance, next, "draw {} leaves a gap", i);
        assert!(draw.instance_count > 0);
        let range = draw.first_instance as usize..(draw.first_instance + draw.instance_count) as usize;
        for batch in &objects[range] {
            assert_eq!((batch.shader, batch.mesh), (draw.shader, draw.mesh));
        }
        if i > 0 {
            let prev = &draws[i - 1];
            assert_ne!((prev.shader, prev.mesh), (draw.shader, draw.mesh));
        }
        next += draw.instance_count;
    }
    assert_eq!(next as usize, objects.len());

    let mut next = 0u32;
    for (i, shader) in shaders.iter().enumerate() {
        assert_eq!(shader.first, next, "shader batch {} leaves a gap", i);
        assert!(shader.count > 0);
        for draw in &draws[shader.first as usize..(shader.first + shader.count) as usize] {
            assert_eq!(draw.shader, shader.shader);
        }
        if i > 0 {
            assert!(shaders[i - 1].shader < shader.shader);
        }
        next += shader.count;
    }
    assert_eq!(next as usize, draws.len());

    // Every live object sits in the partition exactly once, under its current key.
    let mut live = 0;
    for (handle, entry) in server.objects().iter() {
        live += 1;
        let BatchState::Batched(key) = entry.state() else {
            panic!("{:?} left unbatched after prepare", handle);
        };
        assert_eq!(key.object, handle.index());
        assert_eq!(key.mesh, entry.geometry());
        assert_eq!(key.shader, entry.shader());
        assert!(objects.binary_search(&key).is_ok());
    }
    assert_eq!(live, objects.len());

    if draws.is_empty() {
        return;
    }

    let handles = server.object_handles().buffer().read::<u32>(objects.len());
    let data = server
        .object_data()
        .buffer()
        .read::<ObjectData>(server.object_data().len());
    for (position, batch) in objects.iter().enumerate() {
        let entry = server
            .objects()
            .iter()
            .find(|(handle, _)| handle.index() == batch.object)
            .map(|(_, entry)| entry)
            .unwrap();
        assert_eq!(handles[position], entry.gpu_slot());

        let slot = entry.gpu_slot() as usize;
        assert_eq!(
            data[slot],
            ObjectData::new(
                entry.transform().matrix(),
                server.materials().slot(entry.material_handle()).unwrap()
            )
        );
    }

    let commands = server
        .indirect()
        .buffer()
        .read::<DrawIndexedIndirect>(draws.len());
    for (command, draw) in commands.iter().zip(draws) {
        let record = server.geometry().get(draw.mesh).unwrap();
        assert_eq!(command.index_count, record.index_count);
        assert_eq!(command.first_index, record.first_index);
        assert_eq!(command.base_vertex, record.base_vertex as i32);
        assert_eq!(command.instance_count, draw.instance_count);
        assert_eq!(command.first_instance, draw.first_instance);
    }
}
