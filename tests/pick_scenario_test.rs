//! End-to-end pick scenario against a live GPU. Needs an adapter and a
//! display, so it hides behind the `integration-tests` feature like the
//! other windowed tests.

#[cfg(feature = "integration-tests")]
mod gpu {
    use std::thread;
    use std::time::{Duration, Instant};

    use voxvis::{Material, PickResult, Transform, Vector3, Visualizer, unit_cube};

    fn poll_pick(client: &voxvis::SceneClient, timeout: Duration) -> Option<PickResult> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Some(result) = client.take_pick_result() {
                return Some(result);
            }
            thread::sleep(Duration::from_millis(10));
        }
        None
    }

    #[test]
    fn pick_follows_upsert_update_and_remove() {
        let (visualizer, client) = Visualizer::new();
        let render_thread = thread::spawn(move || visualizer.start());

        // A cube big enough to cover the window center at the default
        // camera distance.
        let (vertices, indices) = unit_cube();
        let transform = Transform {
            scale: Vector3::new(4.0, 4.0, 4.0),
            ..Transform::default()
        };
        client.upsert_geometry(
            "cube",
            vertices.clone(),
            indices.clone(),
            transform,
            Material::default(),
        );

        client.request_pick_at(400, 300);
        assert_eq!(
            poll_pick(&client, Duration::from_secs(10)),
            Some(PickResult::Hit("cube".into()))
        );

        // An update keeps the name stable under the cursor.
        let moved = Transform {
            position: Vector3::new(0.0, 0.5, 0.0),
            scale: Vector3::new(4.0, 4.0, 4.0),
            ..Transform::default()
        };
        client.upsert_geometry("cube", vertices, indices, moved, Material::default());
        client.request_pick_at(400, 300);
        assert_eq!(
            poll_pick(&client, Duration::from_secs(10)),
            Some(PickResult::Hit("cube".into()))
        );

        client.remove_geometry("cube");
        client.request_pick_at(400, 300);
        assert_eq!(
            poll_pick(&client, Duration::from_secs(10)),
            Some(PickResult::Miss)
        );

        client.close();
        render_thread
            .join()
            .expect("render thread panicked")
            .expect("visualizer setup failed");
    }
}
