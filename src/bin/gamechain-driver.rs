//! Drives a small multi-node network end to end: three fully-meshed
//! `MainNode`s, four games among eight `Player`s, a short burst of
//! alternating moves, then a timed run with graceful shutdown.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use rand::seq::SliceRandom;

use gamechain::config::ChainConfig;
use gamechain::game::Game;
use gamechain::journal::{Journal, JsonFileJournal, NullJournal};
use gamechain::main_node::MainNode;
use gamechain::player::Player;

#[derive(Parser, Debug)]
#[clap(name = "gamechain-driver", about = "Runs a small gamechain network")]
struct Cli {
    /// How long to let the network mine after moves are submitted.
    #[clap(long, default_value = "30")]
    run_secs: u64,

    /// Directory for JSON audit files. Omit for no journaling.
    #[clap(long)]
    journal_dir: Option<String>,

    /// Leading hex zeros required of a mined GameBlock hash.
    #[clap(long, default_value = "4")]
    game_difficulty: u32,

    /// Leading hex zeros required of a mined MainBlock hash.
    #[clap(long, default_value = "5")]
    main_difficulty: u32,
}

fn random_move() -> String {
    let files = ["a", "b", "c", "d", "e", "f", "g", "h"];
    let ranks = ["1", "2", "3", "4", "5", "6", "7", "8"];
    let pieces = ["", "N", "B", "R", "Q", "K"];
    let mut rng = rand::thread_rng();
    format!(
        "{}{}{}",
        pieces.choose(&mut rng).unwrap(),
        files.choose(&mut rng).unwrap(),
        ranks.choose(&mut rng).unwrap()
    )
}

fn start_game(p1: &Arc<Player>, p2: &Arc<Player>, chain_length: usize) -> Result<()> {
    let game = Game::new(vec![p1.public_key.clone(), p2.public_key.clone()], chain_length)?;
    p1.start_game(p2, game.clone())?;
    p2.start_game(p1, game)?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Cli::parse();

    let config = ChainConfig {
        game_difficulty: args.game_difficulty,
        main_difficulty: args.main_difficulty,
        ..ChainConfig::default()
    };

    let journal: Arc<dyn Journal> = match &args.journal_dir {
        Some(dir) => Arc::new(JsonFileJournal::new(dir)),
        None => Arc::new(NullJournal),
    };

    let node1 = MainNode::new(config, journal.clone());
    let node2 = MainNode::new(config, journal.clone());
    let node3 = MainNode::new(config, journal.clone());
    node1.connect_peer(&node2);
    node1.connect_peer(&node3);
    node2.connect_peer(&node3);
    log::info!("main nodes {} {} {} connected", node1.node_id, node2.node_id, node3.node_id);

    let main_handles: Vec<_> = [node1.clone(), node2.clone(), node3.clone()]
        .into_iter()
        .map(|n| thread::spawn(move || n.run()))
        .collect();

    let players: Vec<Arc<Player>> = (0..8).map(|_| Player::new(config, journal.clone())).collect();
    players[0].connect_node(&node1);
    players[1].connect_node(&node1);
    players[2].connect_node(&node2);
    players[3].connect_node(&node2);
    players[4].connect_node(&node3);
    players[5].connect_node(&node3);
    players[6].connect_node(&node3);
    players[7].connect_node(&node3);

    start_game(&players[0], &players[1], config.game_chain_length)?;
    start_game(&players[2], &players[3], config.game_chain_length)?;
    start_game(&players[4], &players[5], config.game_chain_length)?;
    start_game(&players[6], &players[7], config.game_chain_length)?;
    log::info!("4 games started among 8 players");

    let mut turn = false;
    for _ in 0..10 {
        let mv = random_move();
        for (i, p) in players.iter().enumerate() {
            if (i % 2 == 0) == turn {
                if let Err(e) = p.create_move(mv.clone()) {
                    log::warn!("create_move failed: {}", e);
                }
            }
        }
        turn = !turn;
        thread::sleep(Duration::from_millis(100));
    }
    log::info!("moves submitted");

    let player_handles: Vec<_> = players
        .iter()
        .cloned()
        .map(|p| thread::spawn(move || p.run()))
        .collect();

    thread::sleep(Duration::from_secs(args.run_secs));

    node1.stop();
    node2.stop();
    node3.stop();
    for p in &players {
        p.stop();
    }

    for h in player_handles {
        let _ = h.join();
    }
    for h in main_handles {
        let _ = h.join();
    }

    println!("Final ratings:");
    for (player, rating) in node1.ratings() {
        println!("  {}: {}", &player[player.len().saturating_sub(16)..], rating);
    }

    Ok(())
}
