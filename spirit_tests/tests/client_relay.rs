//! Socket-level tests: real clients talking through a running relay.

use std::time::Duration;

use spirit_client::GameClient;
use spirit_shared::{
    grid::{Grid, TilePos},
    net::{ClientMsg, ConnectionId, ServerMsg},
    physics::InputIntent,
};
use spirit_tests::{init_tracing, raw_connect, recv_within, spawn_relay, TEST_LEVEL, WAIT};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn new_connection_receives_level_and_spawn() -> anyhow::Result<()> {
    init_tracing();
    let (_relay, cfg) = spawn_relay().await?;

    let mut conn = raw_connect(&cfg).await?;
    let ServerMsg::Init {
        blocks,
        width,
        height,
        spawn_point,
    } = recv_within(&mut conn).await?
    else {
        panic!("first message must be init");
    };

    let level = Grid::from_level_str(TEST_LEVEL)?;
    assert_eq!((width, height), (6, 4));
    assert_eq!(blocks.as_slice(), level.cells());
    assert!(level.spawn_points().contains(&spawn_point));

    let client = GameClient::connect(&cfg).await?;
    assert_eq!(client.grid, Grid::from_cells(blocks, vec![client.spawn])?);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn playerdata_reaches_peers_tagged_with_sender_id() -> anyhow::Result<()> {
    init_tracing();
    let (_relay, cfg) = spawn_relay().await?;

    let mut a = GameClient::connect(&cfg).await?;
    let mut b = GameClient::connect(&cfg).await?;

    a.tick(InputIntent::RIGHT, 16.0).await?;
    let Some(ServerMsg::PlayerData(data)) = b.recv_message(WAIT).await else {
        panic!("expected relayed playerdata");
    };
    assert_eq!(data.id, Some(ConnectionId(0)));
    assert_eq!(data.x, a.player.position.x);
    assert_eq!(data.dx, a.player.velocity.x);
    assert_eq!(b.remotes.len(), 1);

    // Never echoed to the sender.
    assert_eq!(a.recv_message(Duration::from_millis(200)).await, None);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tile_updates_are_shared_and_persist() -> anyhow::Result<()> {
    init_tracing();
    let (_relay, cfg) = spawn_relay().await?;

    let mut writer = raw_connect(&cfg).await?;
    recv_within(&mut writer).await?;
    let mut watcher = GameClient::connect(&cfg).await?;
    assert!(!watcher.grid.is_occupied(0, 5));

    writer
        .send(&ClientMsg::SpiritUpd {
            pos: TilePos::new(5, 0),
            value: true,
        })
        .await?;
    assert_eq!(
        watcher.recv_message(WAIT).await,
        Some(ServerMsg::BlockUpd {
            x: 5,
            y: 0,
            block: true
        })
    );
    assert!(watcher.grid.is_occupied(0, 5));

    let late = GameClient::connect(&cfg).await?;
    assert!(late.grid.is_occupied(0, 5));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn detach_round_trip_restores_shared_tile() -> anyhow::Result<()> {
    init_tracing();
    let (_relay, cfg) = spawn_relay().await?;

    let mut spirit = GameClient::connect(&cfg).await?;
    let mut watcher = GameClient::connect(&cfg).await?;
    let tile = spirit.spawn;
    let before = watcher.grid.clone();

    spirit.tick(InputIntent::TOGGLE_SPIRIT, 16.0).await?;
    spirit.tick(InputIntent::empty(), 16.0).await?;
    assert!(spirit.player.is_detached());
    spirit.tick(InputIntent::TOGGLE_SPIRIT, 16.0).await?;
    spirit.tick(InputIntent::empty(), 16.0).await?;
    assert!(!spirit.player.is_detached());

    let mut block_updates = Vec::new();
    while let Some(msg) = watcher.recv_message(Duration::from_millis(300)).await {
        if let ServerMsg::BlockUpd { x, y, block } = msg {
            block_updates.push((x, y, block));
        }
    }
    assert_eq!(
        block_updates,
        vec![(tile.x, tile.y, false), (tile.x, tile.y, false)]
    );
    // Spawn points differ per client; only the tiles are shared.
    assert_eq!(watcher.grid.cells(), before.cells());
    assert_eq!(spirit.grid.cells(), before.cells());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reattach_after_moving_fills_the_new_tile() -> anyhow::Result<()> {
    init_tracing();
    let (_relay, cfg) = spawn_relay().await?;

    let mut spirit = GameClient::connect(&cfg).await?;
    let mut watcher = GameClient::connect(&cfg).await?;
    let tile = spirit.spawn;
    // Both spawn tiles have an empty neighbor standing on the floor.
    let (dir, target) = if tile.x == 1 {
        (InputIntent::RIGHT, tile.x + 1)
    } else {
        (InputIntent::LEFT, tile.x - 1)
    };

    spirit.tick(InputIntent::TOGGLE_SPIRIT, 16.0).await?;
    spirit.tick(InputIntent::empty(), 16.0).await?;
    for _ in 0..10 {
        if spirit.physics.tile_of(spirit.player.position, &spirit.grid) == (tile.y, target) {
            break;
        }
        spirit.tick(dir, 16.0).await?;
    }
    spirit.tick(InputIntent::TOGGLE_SPIRIT, 16.0).await?;
    spirit.tick(InputIntent::empty(), 16.0).await?;
    assert!(!spirit.player.is_detached());

    let mut block_updates = Vec::new();
    while let Some(msg) = watcher.recv_message(Duration::from_millis(300)).await {
        if let ServerMsg::BlockUpd { x, y, block } = msg {
            block_updates.push((x, y, block));
        }
    }
    assert_eq!(
        block_updates,
        vec![(tile.x, tile.y, false), (target, tile.y, true)]
    );
    assert!(watcher.grid.is_occupied(tile.y, target));
    assert_eq!(watcher.grid.cells(), spirit.grid.cells());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn disconnect_notifies_peers_and_id_is_reused() -> anyhow::Result<()> {
    init_tracing();
    let (_relay, cfg) = spawn_relay().await?;

    let first = GameClient::connect(&cfg).await?;
    let mut watcher = GameClient::connect(&cfg).await?;
    drop(first);

    assert_eq!(
        watcher.recv_message(WAIT).await,
        Some(ServerMsg::PlayerDisconnect {
            id: ConnectionId(0)
        })
    );

    let mut replacement = GameClient::connect(&cfg).await?;
    replacement.tick(InputIntent::empty(), 16.0).await?;
    let Some(ServerMsg::PlayerData(data)) = watcher.recv_message(WAIT).await else {
        panic!("expected playerdata from the replacement");
    };
    assert_eq!(data.id, Some(ConnectionId(0)));
    Ok(())
}
