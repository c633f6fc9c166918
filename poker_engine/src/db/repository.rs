//! Trait-based repository over player profiles (spec §6), enabling testing
//! through a mock implementation without a live database. Grounded in the
//! teacher's `UserRepository`/`PgUserRepository`/`mock::MockUserRepository`
//! pattern (`db/repository.rs`), narrowed to the one resource this crate
//! persists: a player's bankroll and hand history.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use thiserror::Error;

use super::timeouts::{with_default_timeout, with_long_timeout, TimeoutError};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Timeout(#[from] TimeoutError),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// A player's persisted identity and bankroll (spec §3, §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub player_id: String,
    pub display_name: String,
    pub chips: u64,
    pub loan_count: u64,
    pub hands_played: u64,
}

/// One seated participant's net change over a settled hand (spec §6
/// `persist_hand(player_id, chip_delta, loan_delta, hands_delta)`):
/// signed, so a loser's chip debit and a loan grant/refund are both
/// representable, unlike a payout-only record.
#[derive(Debug, Clone)]
pub struct PlayerSettlement {
    pub player_id: String,
    pub chip_delta: i64,
    pub loan_delta: i64,
    pub hands_delta: u64,
}

/// One completed hand's settlement, written after `HandEngine::play` returns
/// (spec §4.6 "persistence hooks"). Carries a [`PlayerSettlement`] for every
/// seated participant, winners and losers alike.
#[derive(Debug, Clone)]
pub struct HandRecord {
    pub game_id: String,
    pub room_id: String,
    pub settlements: Vec<PlayerSettlement>,
}

/// One ranking table row (spec §6 `update-ranking-data`), ordered by chips
/// descending by the repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankingEntry {
    pub player_id: String,
    pub display_name: String,
    pub chips: u64,
    pub hands_played: u64,
}

#[async_trait]
pub trait ProfileRepository: Send + Sync {
    /// Loads a player's persisted profile, or `None` for a first-time player
    /// (the lobby then seats them with the server's starting stack).
    async fn load_profile(&self, player_id: &str) -> RepositoryResult<Option<Profile>>;

    /// Creates or tops up a profile to at least `chips` (first connection).
    async fn ensure_profile(
        &self,
        player_id: &str,
        display_name: &str,
        chips: u64,
    ) -> RepositoryResult<Profile>;

    /// Applies every seated participant's signed chip and loan deltas and
    /// increments each one's `hands_played` (spec §4.6 "every participant's
    /// hands-played counter"), not just the hand's winners.
    async fn persist_hand(&self, hand: &HandRecord) -> RepositoryResult<()>;

    /// Top `limit` profiles by chips, for the ranking broadcast.
    async fn fetch_ranking(&self, limit: i64) -> RepositoryResult<Vec<RankingEntry>>;
}

pub struct PgProfileRepository {
    pool: PgPool,
}

impl PgProfileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileRepository for PgProfileRepository {
    async fn load_profile(&self, player_id: &str) -> RepositoryResult<Option<Profile>> {
        let row = with_default_timeout(
            sqlx::query(
                "SELECT player_id, display_name, chips, loan_count, hands_played FROM profiles WHERE player_id = $1",
            )
            .bind(player_id)
            .fetch_optional(&self.pool),
        )
        .await?;

        Ok(row.map(|r| Profile {
            player_id: r.get("player_id"),
            display_name: r.get("display_name"),
            chips: r.get::<i64, _>("chips") as u64,
            loan_count: r.get::<i64, _>("loan_count") as u64,
            hands_played: r.get::<i64, _>("hands_played") as u64,
        }))
    }

    async fn ensure_profile(
        &self,
        player_id: &str,
        display_name: &str,
        chips: u64,
    ) -> RepositoryResult<Profile> {
        let row = with_default_timeout(
            sqlx::query(
                "INSERT INTO profiles (player_id, display_name, chips, loan_count, hands_played)
                 VALUES ($1, $2, $3, 0, 0)
                 ON CONFLICT (player_id) DO UPDATE SET display_name = EXCLUDED.display_name
                 RETURNING player_id, display_name, chips, loan_count, hands_played",
            )
            .bind(player_id)
            .bind(display_name)
            .bind(chips as i64)
            .fetch_one(&self.pool),
        )
        .await?;

        Ok(Profile {
            player_id: row.get("player_id"),
            display_name: row.get("display_name"),
            chips: row.get::<i64, _>("chips") as u64,
            loan_count: row.get::<i64, _>("loan_count") as u64,
            hands_played: row.get::<i64, _>("hands_played") as u64,
        })
    }

    async fn persist_hand(&self, hand: &HandRecord) -> RepositoryResult<()> {
        with_long_timeout(async {
            let mut tx = self.pool.begin().await?;
            for settlement in &hand.settlements {
                sqlx::query(
                    "UPDATE profiles
                     SET chips = (chips::BIGINT + $1)::BIGINT,
                         loan_count = (loan_count::BIGINT + $2)::BIGINT,
                         hands_played = hands_played + $3
                     WHERE player_id = $4",
                )
                .bind(settlement.chip_delta)
                .bind(settlement.loan_delta)
                .bind(settlement.hands_delta as i64)
                .bind(&settlement.player_id)
                .execute(&mut *tx)
                .await?;
            }
            sqlx::query("INSERT INTO hand_history (game_id, room_id) VALUES ($1, $2)")
                .bind(&hand.game_id)
                .bind(&hand.room_id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await
        })
        .await?;
        Ok(())
    }

    async fn fetch_ranking(&self, limit: i64) -> RepositoryResult<Vec<RankingEntry>> {
        let rows = with_default_timeout(
            sqlx::query(
                "SELECT player_id, display_name, chips, hands_played
                 FROM profiles ORDER BY chips DESC LIMIT $1",
            )
            .bind(limit)
            .fetch_all(&self.pool),
        )
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| RankingEntry {
                player_id: r.get("player_id"),
                display_name: r.get("display_name"),
                chips: r.get::<i64, _>("chips") as u64,
                hands_played: r.get::<i64, _>("hands_played") as u64,
            })
            .collect())
    }
}

/// In-memory stand-in for tests and the single-process demo server.
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MockProfileRepository {
        profiles: Mutex<HashMap<String, Profile>>,
    }

    impl MockProfileRepository {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_profile(self, profile: Profile) -> Self {
            self.profiles
                .lock()
                .unwrap()
                .insert(profile.player_id.clone(), profile);
            self
        }
    }

    #[async_trait]
    impl ProfileRepository for MockProfileRepository {
        async fn load_profile(&self, player_id: &str) -> RepositoryResult<Option<Profile>> {
            Ok(self.profiles.lock().unwrap().get(player_id).cloned())
        }

        async fn ensure_profile(
            &self,
            player_id: &str,
            display_name: &str,
            chips: u64,
        ) -> RepositoryResult<Profile> {
            let mut profiles = self.profiles.lock().unwrap();
            let profile = profiles.entry(player_id.to_string()).or_insert_with(|| Profile {
                player_id: player_id.to_string(),
                display_name: display_name.to_string(),
                chips,
                loan_count: 0,
                hands_played: 0,
            });
            Ok(profile.clone())
        }

        async fn persist_hand(&self, hand: &HandRecord) -> RepositoryResult<()> {
            let mut profiles = self.profiles.lock().unwrap();
            for settlement in &hand.settlements {
                if let Some(profile) = profiles.get_mut(&settlement.player_id) {
                    profile.chips = (profile.chips as i64 + settlement.chip_delta).max(0) as u64;
                    profile.loan_count =
                        (profile.loan_count as i64 + settlement.loan_delta).max(0) as u64;
                    profile.hands_played += settlement.hands_delta;
                }
            }
            Ok(())
        }

        async fn fetch_ranking(&self, limit: i64) -> RepositoryResult<Vec<RankingEntry>> {
            let profiles = self.profiles.lock().unwrap();
            let mut ranking: Vec<RankingEntry> = profiles
                .values()
                .map(|p| RankingEntry {
                    player_id: p.player_id.clone(),
                    display_name: p.display_name.clone(),
                    chips: p.chips,
                    hands_played: p.hands_played,
                })
                .collect();
            ranking.sort_by(|a, b| b.chips.cmp(&a.chips));
            ranking.truncate(limit.max(0) as usize);
            Ok(ranking)
        }
    }

    #[tokio::test]
    async fn ensure_profile_is_idempotent_for_an_existing_player() {
        let repo = MockProfileRepository::new().with_profile(Profile {
            player_id: "p1".into(),
            display_name: "Alice".into(),
            chips: 500,
            loan_count: 0,
            hands_played: 3,
        });
        let profile = repo.ensure_profile("p1", "Alice", 1000).await.unwrap();
        assert_eq!(profile.chips, 500, "existing bankroll is not reset");
    }

    #[tokio::test]
    async fn persist_hand_settles_every_participant_winners_and_losers_alike() {
        let repo = MockProfileRepository::new()
            .with_profile(Profile {
                player_id: "p1".into(),
                display_name: "Alice".into(),
                chips: 500,
                loan_count: 1,
                hands_played: 3,
            })
            .with_profile(Profile {
                player_id: "p2".into(),
                display_name: "Bob".into(),
                chips: 500,
                loan_count: 0,
                hands_played: 3,
            });

        repo.persist_hand(&HandRecord {
            game_id: "g1".into(),
            room_id: "r1".into(),
            settlements: vec![
                PlayerSettlement {
                    player_id: "p1".to_string(),
                    chip_delta: 150,
                    loan_delta: -1,
                    hands_delta: 1,
                },
                PlayerSettlement {
                    player_id: "p2".to_string(),
                    chip_delta: -150,
                    loan_delta: 0,
                    hands_delta: 1,
                },
            ],
        })
        .await
        .unwrap();

        let p1 = repo.load_profile("p1").await.unwrap().unwrap();
        assert_eq!(p1.chips, 650);
        assert_eq!(p1.loan_count, 0, "the winner's outstanding loan is refunded");
        assert_eq!(p1.hands_played, 4);
        let p2 = repo.load_profile("p2").await.unwrap().unwrap();
        assert_eq!(p2.chips, 350, "the loser's stack is debited, not left untouched");
        assert_eq!(p2.hands_played, 4, "every seated participant's hand count advances");
    }

    #[tokio::test]
    async fn fetch_ranking_orders_by_chips_descending() {
        let repo = MockProfileRepository::new()
            .with_profile(Profile {
                player_id: "p1".into(),
                display_name: "Alice".into(),
                chips: 100,
                loan_count: 0,
                hands_played: 1,
            })
            .with_profile(Profile {
                player_id: "p2".into(),
                display_name: "Bob".into(),
                chips: 900,
                loan_count: 0,
                hands_played: 1,
            });
        let ranking = repo.fetch_ranking(10).await.unwrap();
        assert_eq!(ranking[0].player_id, "p2");
        assert_eq!(ranking[1].player_id, "p1");
    }
}
