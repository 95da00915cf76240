//! Partition behaviour of `RenderServer::prepare` across object creation,
//! reassignment and removal.

mod common;

use std::collections::HashMap;
use std::rc::Rc;

use common::{assert_consistent, materials, meshes, server, S1, S2};
use glam::{Quat, Vec3};
use indirect_batcher::renderer::{cube_mesh, plane_mesh, BatchState};
use indirect_batcher::{Material, ObjectHandle};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

#[test]
fn three_objects_one_mesh_make_one_draw() {
    let mut server = server();
    let m1 = Rc::new(cube_mesh());
    let material = Material::unlit(S1, Vec3::ONE).into_shared();
    for _ in 0..3 {
        server.create_object(&m1, &material).unwrap();
    }

    server.prepare().unwrap();
    let batches = server.batches();

    assert_eq!(batches.object_batches().len(), 3);
    assert_eq!(batches.draw_batches().len(), 1);
    assert_eq!(batches.draw_batches()[0].instance_count, 3);
    assert_eq!(batches.shader_batches().len(), 1);
    assert_eq!(batches.shader_batches()[0].first, 0);
    assert_eq!(batches.shader_batches()[0].count, 1);
    assert_consistent(&server);
}

#[test]
fn mesh_change_splits_draw_under_same_shader() {
    let mut server = server();
    let m1 = Rc::new(cube_mesh());
    let m2 = Rc::new(plane_mesh(1.0));
    let material = Material::unlit(S1, Vec3::ONE).into_shared();
    let handles: Vec<ObjectHandle> = (0..3)
        .map(|_| server.create_object(&m1, &material).unwrap())
        .collect();
    server.prepare().unwrap();

    server.set_mesh(handles[1], &m2).unwrap();
    let stats = server.prepare().unwrap();

    assert!(stats.partition_rebuilt);
    let counts: Vec<u32> = server
        .batches()
        .draw_batches()
        .iter()
        .map(|d| d.instance_count)
        .collect();
    assert_eq!(counts, vec![2, 1]);
    assert_eq!(server.batches().shader_batches().len(), 1);
    assert_eq!(server.batches().shader_batches()[0].count, 2);
    assert_consistent(&server);
}

#[test]
fn mesh_change_before_first_frame_queues_once() {
    let mut server = server();
    let m1 = Rc::new(cube_mesh());
    let m2 = Rc::new(plane_mesh(1.0));
    let material = Material::unlit(S1, Vec3::ONE).into_shared();

    let handle = server.create_object(&m1, &material).unwrap();
    server.set_mesh(handle, &m2).unwrap();

    assert_eq!(server.objects().pending_unbatched(), &[handle]);
    assert!(server.objects().pending_removals().is_empty());
    assert_eq!(server.object(handle).unwrap().state(), BatchState::Unbatched);

    server.prepare().unwrap();
    let batches = server.batches().object_batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].mesh, server.object(handle).unwrap().geometry());
    assert_consistent(&server);
}

#[test]
fn repeated_changes_between_frames_unbatch_once() {
    let mut server = server();
    let meshes = meshes();
    let material = Material::unlit(S1, Vec3::ONE).into_shared();
    let handle = server.create_object(&meshes[0], &material).unwrap();
    server.prepare().unwrap();

    server.set_mesh(handle, &meshes[1]).unwrap();
    server.set_mesh(handle, &meshes[2]).unwrap();
    server.objects_mut().translate(handle, Vec3::X).unwrap();
    assert_eq!(server.objects().pending_updates(), &[handle]);

    server.prepare().unwrap();
    assert_eq!(server.batches().object_batches().len(), 1);
    assert_consistent(&server);
}

#[test]
fn shaders_form_contiguous_slices() {
    let mut server = server();
    let meshes = meshes();
    let a = Material::unlit(S2, Vec3::ONE).into_shared();
    let b = Material::lambert(S1, Vec3::ONE).into_shared();
    for i in 0..8 {
        let material = if i % 2 == 0 { &a } else { &b };
        server
            .create_object(&meshes[i % meshes.len()], material)
            .unwrap();
    }

    let stats = server.prepare().unwrap();
    assert_eq!(stats.shader_batches, 2);
    assert_eq!(server.batches().shader_batches()[0].shader, S1);
    assert_consistent(&server);
}

#[test]
fn transform_only_frame_keeps_partition() {
    let mut server = server();
    let meshes = meshes();
    let material = Material::unlit(S1, Vec3::ONE).into_shared();
    let handle = server.create_object(&meshes[0], &material).unwrap();
    server.prepare().unwrap();

    server.objects_mut().rotate(handle, Quat::from_rotation_x(0.3)).unwrap();
    server.objects_mut().set_scale(handle, Vec3::splat(2.0)).unwrap();
    let stats = server.prepare().unwrap();

    assert!(!stats.partition_rebuilt);
    assert_eq!(stats.objects_uploaded, 1);
    assert_consistent(&server);
}

#[test]
fn removed_then_recreated_index_rebatches_cleanly() {
    let mut server = server();
    let meshes = meshes();
    let materials = materials();
    let a = server.create_object(&meshes[0], &materials[0]).unwrap();
    server.create_object(&meshes[1], &materials[2]).unwrap();
    server.prepare().unwrap();

    server.remove_object(a).unwrap();
    let b = server.create_object(&meshes[0], &materials[0]).unwrap();
    assert_eq!(a.index(), b.index());
    assert!(server.object(a).is_none());

    server.prepare().unwrap();
    assert_eq!(server.batches().object_batches().len(), 2);
    assert_consistent(&server);
}

/// Random creation, reassignment, transform and removal sequences; the
/// partition must stay well formed and every object keep its data slot.
#[test]
fn random_sequences_preserve_partition_and_slots() {
    let meshes = meshes();
    let materials = materials();

    for seed in 0..8 {
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut server = if seed % 2 == 0 {
            common::cramped_server()
        } else {
            server()
        };
        let mut live: Vec<ObjectHandle> = Vec::new();
        let mut slots: HashMap<ObjectHandle, u32> = HashMap::new();

        for step in 0..300 {
            match rng.gen_range(0..10) {
                0..=3 => {
                    let mesh = &meshes[rng.gen_range(0..meshes.len())];
                    let material = &materials[rng.gen_range(0..materials.len())];
                    let handle = server.create_object(mesh, material).unwrap();
                    slots.insert(handle, server.object(handle).unwrap().gpu_slot());
                    live.push(handle);
                }
                4 if !live.is_empty() => {
                    let handle = live.swap_remove(rng.gen_range(0..live.len()));
                    slots.remove(&handle);
                    server.remove_object(handle).unwrap();
                }
                5 | 6 if !live.is_empty() => {
                    let handle = live[rng.gen_range(0..live.len())];
                    server
                        .set_mesh(handle, &meshes[rng.gen_range(0..meshes.len())])
                        .unwrap();
                }
                7 if !live.is_empty() => {
                    let handle = live[rng.gen_range(0..live.len())];
                    server
                        .set_material(handle, &materials[rng.gen_range(0..materials.len())])
                        .unwrap();
                }
                8 if !live.is_empty() => {
                    let handle = live[rng.gen_range(0..live.len())];
                    let delta = Vec3::new(rng.gen(), rng.gen(), rng.gen());
                    server.objects_mut().translate(handle, delta).unwrap();
                }
                _ => {
                    server.prepare().unwrap();
                    assert_consistent(&server);
                }
            }

            if step % 25 == 24 {
                server.prepare().unwrap();
                assert_consistent(&server);
            }
        }

        server.prepare().unwrap();
        assert_consistent(&server);

        let mut seen = std::collections::HashSet::new();
        for (&handle, &slot) in &slots {
            assert_eq!(server.object(handle).unwrap().gpu_slot(), slot);
            assert!(seen.insert(slot), "slot {} shared by two live objects", slot);
        }
        assert_eq!(server.objects().len(), live.len());
    }
}
