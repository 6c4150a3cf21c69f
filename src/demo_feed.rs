use std::sync::mpsc::Sender;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;

use crate::roster::{PlayerRef, Roster, TeamSide};
use crate::session::Delta;

/// Stands in for the ball-tracker operator: hands the ball around the
/// roster at a human-ish pace, with the odd stoppage.
pub fn spawn_demo_ball_tracker(tx: Sender<Delta>, roster: Roster) {
    thread::spawn(move || {
        let mut rng = rand::thread_rng();
        let players = roster.players();
        if players.is_empty() {
            let _ = tx.send(Delta::Log("[WARN] Demo feed: empty roster".to_string()));
            return;
        }
        let _ = tx.send(Delta::Log("[INFO] Demo ball tracker running".to_string()));

        let mut holder: Option<PlayerRef> = None;
        loop {
            thread::sleep(Duration::from_millis(rng.gen_range(1200..4200)));

            if rng.gen_bool(0.06) {
                holder = None;
                if tx.send(Delta::BallOut).is_err() {
                    return;
                }
                continue;
            }

            let next = next_holder(&players, holder.as_ref(), &mut rng);
            let delta = Delta::Possession {
                player_id: next.id.clone(),
                at: Utc::now(),
            };
            holder = Some(next);
            if tx.send(delta).is_err() {
                return;
            }
        }
    });
}

// Mostly a team-mate, sometimes a turnover.
fn next_holder(players: &[PlayerRef], current: Option<&PlayerRef>, rng: &mut impl Rng) -> PlayerRef {
    let side = match current {
        Some(p) if rng.gen_bool(0.78) => p.side,
        Some(p) => match p.side {
            TeamSide::Home => TeamSide::Away,
            TeamSide::Away => TeamSide::Home,
        },
        None => {
            if rng.gen_bool(0.5) {
                TeamSide::Home
            } else {
                TeamSide::Away
            }
        }
    };
    let candidates = players
        .iter()
        .filter(|p| p.side == side && current.is_none_or(|c| c.id != p.id))
        .collect::<Vec<_>>();
    if candidates.is_empty() {
        return players[rng.gen_range(0..players.len())].clone();
    }
    candidates[rng.gen_range(0..candidates.len())].clone()
}
