//! End-to-end test over a real TCP socket: the client performs the full
//! join handshake against a running host, submits input, receives snapshots,
//! and fires a scripted event at a level entity.

use std::time::Duration;

use vanguard_client::GameClient;
use vanguard_server::host::ServerHost;
use vanguard_shared::commands::ActionFlags;
use vanguard_shared::components::{Component, Door, Transform, Trigger};
use vanguard_shared::config::GameConfig;
use vanguard_shared::math::{Angles, Vec3};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

fn build_level(host: &mut ServerHost) {
    let server = host.server_mut();
    server.assets_mut().precache_model("models/props/door01.mdl");
    server.assets_mut().precache_sound("sounds/door_open.wav");

    server
        .world_mut()
        .build()
        .with(Component::Transform(Transform::default()))
        .with(Component::Door(Door::default()))
        .with_key_value("targetname", "exit_door")
        .with_key_value("origin", "0 256 0")
        .spawn();
    server
        .world_mut()
        .build()
        .with(Component::Transform(Transform::default()))
        .with(Component::Trigger(Trigger::default()))
        .with_key_value("targetname", "start_button")
        .spawn();
    server.finish_level_load();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn client_joins_moves_and_triggers_a_door() -> anyhow::Result<()> {
    init_tracing();

    let cfg = GameConfig {
        server_addr: "127.0.0.1:0".to_string(),
        ..GameConfig::default()
    };
    let (mut host, local) = ServerHost::bind(cfg).await?;
    build_level(&mut host);

    // 120 simulation frames at 40 Hz: three seconds of server time.
    let server_task = tokio::spawn(async move {
        host.run_frames(120).await.map(|_| host)
    });

    let client_cfg = GameConfig {
        server_addr: local.to_string(),
        player_name: "Courier".to_string(),
        ..GameConfig::default()
    };
    let mut client = GameClient::connect(&client_cfg).await?;
    client.send_event("exit_door", "Door.Open", None).await?;

    let mut first_x = None;
    let mut last_x = None;
    for _ in 0..30 {
        client
            .send_input(
                Vec3::new(1.0, 0.0, 0.0),
                Angles::new(0.0, 90.0, 0.0),
                ActionFlags::SPRINT,
            )
            .await?;
        client.poll_message(Duration::from_millis(50)).await?;
        if let Some(state) = &client.last_state {
            if let Some(entry) = state.entities.iter().find(|e| e.id == client.entity) {
                if first_x.is_none() {
                    first_x = Some(entry.position.x);
                }
                last_x = Some(entry.position.x);
            }
        }
    }

    let host = server_task.await??;
    let server = host.server();
    assert_eq!(server.connected_count(), 1);
    assert!(server.tick() > 0);

    // The avatar walked forward between snapshots.
    let (first_x, last_x) = (first_x.expect("no snapshot seen"), last_x.unwrap());
    assert!(last_x > first_x, "avatar did not move: {first_x} -> {last_x}");

    // The scripted event reached the door: it opened and lifted.
    let door_id = server.world().find_by_name("exit_door")[0];
    let door_entity = server.world().entity(door_id).unwrap();
    assert!(door_entity.door().unwrap().open);
    assert!(door_entity.transform().unwrap().position.z > 0.0);

    drop(client);
    Ok(())
}
