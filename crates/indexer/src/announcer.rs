//! Winner announcements for grand prize winners

use rand::seq::SliceRandom;
use rand::Rng;
use raffle_sync_core::{DrawRecord, WinnerRecord};

use crate::store::RecordStore;

pub struct WinnerAnnouncer {
    catalog: Vec<String>,
}

impl WinnerAnnouncer {
    /// Catalog of `{base_url}/{i}.webp` for `i` in `1..=count`
    pub fn new(base_url: &str, count: u32) -> Self {
        let base_url = base_url.trim_end_matches('/');
        Self {
            catalog: (1..=count)
                .map(|i| format!("{}/{}.webp", base_url, i))
                .collect(),
        }
    }

    pub fn catalog(&self) -> &[String] {
        &self.catalog
    }

    /// Three catalog entries, drawn independently
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> [String; 3] {
        std::array::from_fn(|_| self.catalog.choose(rng).cloned().unwrap_or_default())
    }

    /// One record per grand prize winner
    pub fn announcements<R: Rng + ?Sized>(
        &self,
        record: &DrawRecord,
        rng: &mut R,
    ) -> Vec<WinnerRecord> {
        record
            .grand_prize_winners
            .iter()
            .map(|wallet| {
                let [asset_first, asset_second, asset_third] = self.pick(rng);
                WinnerRecord {
                    wallet: *wallet,
                    draw_name: record.name.clone(),
                    prize: record.grand_prize,
                    paytoken: record.paytoken,
                    asset_first,
                    asset_second,
                    asset_third,
                }
            })
            .collect()
    }

    /// Post announcements; failures are logged per record. Returns the
    /// number posted.
    pub async fn announce(&self, store: &dyn RecordStore, record: &DrawRecord) -> usize {
        let winners = self.announcements(record, &mut rand::thread_rng());

        let mut posted = 0;
        for winner in &winners {
            match store.add_winner(winner).await {
                Ok(()) => posted += 1,
                Err(e) => e.log_failure("announce", record.draw_id),
            }
        }
        tracing::info!(
            "Announced {}/{} grand prize winners of {:?}",
            posted,
            winners.len(),
            record.draw_id
        );
        posted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, U256};
    use rand::{rngs::StdRng, SeedableRng};
    use raffle_sync_core::{DrawStatus, TreasuryType};

    fn raffled() -> DrawRecord {
        DrawRecord {
            draw_id: Address::repeat_byte(9),
            name: "Friday Raffle".into(),
            owner_wallet: Address::ZERO,
            status: DrawStatus::Raffled,
            grand_prize_margin: 50,
            minor_prize_margin: 10,
            num_grand_wins: 2,
            num_bonus_wins: 1,
            entry_fee: U256::from(10),
            paytoken: Address::repeat_byte(0xee),
            treasury_type: TreasuryType::Fixed,
            treasury: U256::from(600),
            grand_prize: U256::from(250),
            minor_prize: U256::from(100),
            start_time: None,
            end_timestamp: 0,
            owner_charged: true,
            owner_withdrawed: false,
            grand_prize_winners: vec![Address::repeat_byte(1), Address::repeat_byte(2)],
            grand_prize_tokens: vec![4, 7],
            minor_prize_winners: vec![Address::repeat_byte(3)],
            minor_prize_tokens: vec![1],
            root: None,
        }
    }

    #[test]
    fn test_catalog() {
        let announcer = WinnerAnnouncer::new("https://cdn.example/images/", 20);
        assert_eq!(announcer.catalog().len(), 20);
        assert_eq!(announcer.catalog()[0], "https://cdn.example/images/1.webp");
        assert_eq!(announcer.catalog()[19], "https://cdn.example/images/20.webp");
    }

    #[test]
    fn test_one_announcement_per_grand_winner() {
        let announcer = WinnerAnnouncer::new("https://cdn.example", 20);
        let mut rng = StdRng::seed_from_u64(7);
        let record = raffled();

        let winners = announcer.announcements(&record, &mut rng);
        assert_eq!(winners.len(), 2);
        for (winner, wallet) in winners.iter().zip(&record.grand_prize_winners) {
            assert_eq!(winner.wallet, *wallet);
            assert_eq!(winner.draw_name, "Friday Raffle");
            assert_eq!(winner.prize, U256::from(250));
            assert_eq!(winner.paytoken, record.paytoken);
            for asset in [&winner.asset_first, &winner.asset_second, &winner.asset_third] {
                assert!(announcer.catalog().contains(asset));
            }
        }
    }

    #[test]
    fn test_picks_may_repeat() {
        let announcer = WinnerAnnouncer::new("https://cdn.example", 1);
        let picks = announcer.pick(&mut StdRng::seed_from_u64(1));
        assert!(picks.iter().all(|p| p == "https://cdn.example/1.webp"));
    }
}
