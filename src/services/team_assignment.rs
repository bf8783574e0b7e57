use std::collections::{BTreeMap, HashMap};

use rand::Rng;
use rand::seq::SliceRandom;
use thiserror::Error;
use tracing::debug;

use crate::dto::participant_dto::Participant;
use crate::dto::team_dto::{Policy, Team};
use crate::services::team_palette::{team_color, team_id, team_name};

/// Hard ceiling on swaps performed by the balanced policy.
pub const MAX_REFINEMENT_ITERATIONS: usize = 50;

/// Balanced teams stop refining once the average skill gap is below this.
pub const BALANCE_TOLERANCE: f64 = 2.0;

/// Width of the skill bands used by the mixed policy.
pub const SKILL_BAND_WIDTH: f64 = 3.0;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AssignmentError {
    #[error("assign: the team count has to be at least 1, got {0}")]
    InvalidTeamCount(i64),
}

/// Splits `participants` into `team_count` teams under `policy`.
///
/// The input is never mutated; teams hold copies of the participants. All
/// randomness comes from `rng`, so a seeded generator reproduces the exact
/// allocation.
///
/// # Errors
///
/// If `team_count` is 0.
pub fn assign_teams<R: Rng + ?Sized>(
    participants: &[Participant],
    team_count: usize,
    policy: Policy,
    rng: &mut R,
) -> Result<Vec<Team>, AssignmentError> {
    if team_count == 0 {
        return Err(AssignmentError::InvalidTeamCount(0));
    }

    let mut teams = empty_teams(team_count);

    let mut shuffled = participants.to_vec();
    shuffled.shuffle(rng);
    allocate_by_headcount(&mut teams, shuffled);

    match policy {
        Policy::Random => {}
        Policy::Balanced => {
            let swaps = refine_balance(&mut teams);
            debug!("Balanced {} teams with {} swaps.", team_count, swaps);
        }
        Policy::Mixed => mix_skill_bands(&mut teams, participants, rng),
    }

    debug_assert!(
        totals_consistent(&teams),
        "team skill totals drifted from their members"
    );

    Ok(teams)
}

/// Whether every running `total_skill` still matches its members.
///
/// Incremental adds and removes round against the largest magnitude seen,
/// so the tolerance scales with the skill summed over all teams.
pub fn totals_consistent(teams: &[Team]) -> bool {
    let scale = teams
        .iter()
        .map(Team::recomputed_skill)
        .sum::<f64>()
        .max(1.0);

    teams
        .iter()
        .all(|team| (team.total_skill - team.recomputed_skill()).abs() <= 1e-9 * scale)
}

/// Sets every participant's `team_assigned` to the name of the team holding
/// its id. Participants found in no team are cleared.
pub fn stamp_team_assignments(participants: &mut [Participant], teams: &[Team]) {
    let team_by_member: HashMap<&str, &str> = teams
        .iter()
        .flat_map(|team| {
            team.members
                .iter()
                .map(move |member| (member.id.as_str(), team.name.as_str()))
        })
        .collect();

    for participant in participants.iter_mut() {
        participant.team_assigned = team_by_member
            .get(participant.id.as_str())
            .map(|name| (*name).to_string());
    }
}

fn empty_teams(team_count: usize) -> Vec<Team> {
    (0..team_count)
        .map(|slot| Team {
            id: team_id(slot),
            name: team_name(slot),
            color: team_color(slot),
            members: Vec::new(),
            total_skill: 0.0,
        })
        .collect()
}

/// The first `n % k` slots get one extra member.
fn allocate_by_headcount(teams: &mut [Team], shuffled: Vec<Participant>) {
    let base = shuffled.len() / teams.len();
    let remainder = shuffled.len() % teams.len();
    let mut pool = shuffled.into_iter();

    for (slot, team) in teams.iter_mut().enumerate() {
        let size = if slot < remainder { base + 1 } else { base };
        for participant in pool.by_ref().take(size) {
            team.total_skill += participant.skill_or_zero();
            team.members.push(participant);
        }
    }
}

/// Greedy pairwise swaps between the highest and lowest average teams.
/// Returns the number of swaps performed.
pub(crate) fn refine_balance(teams: &mut [Team]) -> usize {
    let mut swaps = 0;

    while swaps < MAX_REFINEMENT_ITERATIONS {
        let Some((high, low, gap)) = widest_gap(teams) else {
            break;
        };
        if gap < BALANCE_TOLERANCE {
            break;
        }
        let Some((outgoing, incoming)) = best_swap(&teams[high], &teams[low], gap) else {
            break;
        };

        swap_members(teams, (high, outgoing), (low, incoming));
        swaps += 1;
    }

    swaps
}

/// Indices of the max and min average teams and the gap between them.
/// Empty teams have no average and are never picked.
fn widest_gap(teams: &[Team]) -> Option<(usize, usize, f64)> {
    let mut high: Option<(usize, f64)> = None;
    let mut low: Option<(usize, f64)> = None;

    for (index, average) in teams
        .iter()
        .enumerate()
        .filter_map(|(index, team)| team.average_skill().map(|average| (index, average)))
    {
        if high.is_none_or(|(_, best)| average > best) {
            high = Some((index, average));
        }
        if low.is_none_or(|(_, best)| average < best) {
            low = Some((index, average));
        }
    }

    let ((high, max), (low, min)) = (high?, low?);
    Some((high, low, max - min))
}

/// Member positions `(in high, in low)` of the swap that shrinks the gap the most.
fn best_swap(high: &Team, low: &Team, gap: f64) -> Option<(usize, usize)> {
    let high_len = high.members.len() as f64;
    let low_len = low.members.len() as f64;
    let mut best: Option<(usize, usize, f64)> = None;

    for (i, outgoing) in high.members.iter().enumerate() {
        let out_skill = outgoing.skill_or_zero();

        for (j, incoming) in low.members.iter().enumerate() {
            let in_skill = incoming.skill_or_zero();
            if out_skill <= in_skill {
                continue;
            }

            let new_high = (high.total_skill - out_skill + in_skill) / high_len;
            let new_low = (low.total_skill - in_skill + out_skill) / low_len;
            let improvement = gap - (new_high - new_low).abs();

            if improvement > 0.0 && best.is_none_or(|(_, _, best)| improvement > best) {
                best = Some((i, j, improvement));
            }
        }
    }

    best.map(|(i, j, _)| (i, j))
}

/// Exchanges two members in place, keeping both positions.
fn swap_members(teams: &mut [Team], (a, i): (usize, usize), (b, j): (usize, usize)) {
    let (first, second) = if a < b {
        let (left, right) = teams.split_at_mut(b);
        (&mut left[a], &mut right[0])
    } else {
        let (left, right) = teams.split_at_mut(a);
        (&mut right[0], &mut left[b])
    };

    let first_skill = first.members[i].skill_or_zero();
    let second_skill = second.members[j].skill_or_zero();

    std::mem::swap(&mut first.members[i], &mut second.members[j]);
    first.total_skill = first.total_skill - first_skill + second_skill;
    second.total_skill = second.total_skill - second_skill + first_skill;
}

fn skill_band(participant: &Participant) -> i64 {
    ((participant.skill_or_zero() / SKILL_BAND_WIDTH).floor() * SKILL_BAND_WIDTH) as i64
}

/// Deals each skill band round robin over the teams, lowest band first.
/// Sizes may end up more than one apart.
fn mix_skill_bands<R: Rng + ?Sized>(teams: &mut [Team], participants: &[Participant], rng: &mut R) {
    let mut bands: BTreeMap<i64, Vec<&Participant>> = BTreeMap::new();
    for participant in participants {
        bands.entry(skill_band(participant)).or_default().push(participant);
    }

    let team_count = teams.len();
    for band in bands.values_mut() {
        band.shuffle(rng);

        for (index, participant) in band.iter().enumerate() {
            let member =
                take_member(teams, &participant.id).unwrap_or_else(|| (*participant).clone());
            let target = &mut teams[index % team_count];
            target.total_skill += member.skill_or_zero();
            target.members.push(member);
        }
    }
}

fn take_member(teams: &mut [Team], id: &str) -> Option<Participant> {
    teams.iter_mut().find_map(|team| {
        let position = team.members.iter().position(|member| member.id == id)?;
        let member = team.members.remove(position);
        team.total_skill -= member.skill_or_zero();
        Some(member)
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    fn participant(id: usize, skill: Option<f64>) -> Participant {
        Participant {
            id: format!("participant_{id}"),
            event_id: "event_test".to_string(),
            name: format!("Player {id}"),
            phone: None,
            skill,
            preferred_team: None,
            team_assigned: None,
            checkin_at: Utc::now(),
        }
    }

    fn with_skills(skills: &[f64]) -> Vec<Participant> {
        skills
            .iter()
            .enumerate()
            .map(|(id, skill)| participant(id, Some(*skill)))
            .collect()
    }

    fn sizes(teams: &[Team]) -> Vec<usize> {
        teams.iter().map(|team| team.members.len()).collect()
    }

    fn sorted_ids(teams: &[Team]) -> Vec<String> {
        let mut ids: Vec<String> = teams
            .iter()
            .flat_map(|team| team.members.iter().map(|member| member.id.clone()))
            .collect();
        ids.sort();
        ids
    }

    fn assert_totals_match(teams: &[Team]) {
        for team in teams {
            assert!(
                (team.total_skill - team.recomputed_skill()).abs() < 1e-9,
                "{} has total {} but members sum to {}",
                team.name,
                team.total_skill,
                team.recomputed_skill()
            );
        }
    }

    const POLICIES: [Policy; 3] = [Policy::Balanced, Policy::Random, Policy::Mixed];

    #[test]
    fn zero_teams_is_rejected() {
        let participants = with_skills(&[1.0, 2.0]);
        let mut rng = StdRng::seed_from_u64(7);

        for policy in POLICIES {
            assert_eq!(
                assign_teams(&participants, 0, policy, &mut rng),
                Err(AssignmentError::InvalidTeamCount(0))
            );
        }
    }

    #[test]
    fn empty_input_gives_empty_teams() {
        let mut rng = StdRng::seed_from_u64(1);

        for policy in POLICIES {
            let teams = assign_teams(&[], 4, policy, &mut rng).unwrap();
            assert_eq!(teams.len(), 4);
            for team in &teams {
                assert!(team.members.is_empty());
                assert_eq!(team.total_skill, 0.0);
            }
        }
    }

    #[test]
    fn teams_are_labelled_by_slot() {
        let mut rng = StdRng::seed_from_u64(1);
        let teams = assign_teams(&[], 10, Policy::Random, &mut rng).unwrap();

        let ids: Vec<&str> = teams.iter().map(|team| team.id.as_str()).collect();
        assert_eq!(ids[0], "team_1");
        assert_eq!(ids[9], "team_10");
        assert_eq!(teams[0].name, "Red Dragons");
        assert_eq!(teams[9].name, "Team J");
        assert_eq!(teams[9].color, "#9CA3AF");
    }

    #[test]
    fn five_into_three_favours_the_first_slots() {
        let participants = with_skills(&[3.0, 1.0, 4.0, 1.0, 5.0]);

        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let teams = assign_teams(&participants, 3, Policy::Random, &mut rng).unwrap();
            assert_eq!(sizes(&teams), vec![2, 2, 1]);

            let mut rng = StdRng::seed_from_u64(seed);
            let teams = assign_teams(&participants, 3, Policy::Balanced, &mut rng).unwrap();
            assert_eq!(sizes(&teams), vec![2, 2, 1]);
        }
    }

    #[test]
    fn headcount_parity_holds_for_random_and_balanced() {
        for n in 0..23 {
            let participants: Vec<Participant> = (0..n)
                .map(|id| participant(id, Some((id * 7 % 11) as f64)))
                .collect();

            for k in 1..=6 {
                for policy in [Policy::Random, Policy::Balanced] {
                    let mut rng = StdRng::seed_from_u64((n * 31 + k) as u64);
                    let teams = assign_teams(&participants, k, policy, &mut rng).unwrap();
                    let sizes = sizes(&teams);

                    for (slot, size) in sizes.iter().enumerate() {
                        let expected = n / k + usize::from(slot < n % k);
                        assert_eq!(*size, expected, "n={n} k={k} policy={policy}");
                    }
                }
            }
        }
    }

    #[test]
    fn every_policy_conserves_participants() {
        let participants: Vec<Participant> = (0..17)
            .map(|id| {
                let skill = if id % 4 == 0 { None } else { Some((id % 10) as f64) };
                participant(id, skill)
            })
            .collect();
        let mut expected: Vec<String> = participants.iter().map(|p| p.id.clone()).collect();
        expected.sort();

        for policy in POLICIES {
            for seed in 0..10 {
                let mut rng = StdRng::seed_from_u64(seed);
                let teams = assign_teams(&participants, 4, policy, &mut rng).unwrap();
                assert_eq!(sorted_ids(&teams), expected, "policy={policy} seed={seed}");
                assert_totals_match(&teams);
            }
        }
    }

    #[test]
    fn input_is_left_untouched() {
        let participants = with_skills(&[9.0, 1.0, 5.0, 5.0, 2.0, 8.0]);
        let snapshot = participants.clone();

        for policy in POLICIES {
            let mut rng = StdRng::seed_from_u64(3);
            assign_teams(&participants, 2, policy, &mut rng).unwrap();
            assert_eq!(participants, snapshot);
        }
    }

    #[test]
    fn same_seed_same_teams() {
        let participants = with_skills(&[10.0, 3.0, 7.0, 2.0, 9.0, 4.0, 6.0, 1.0]);

        for policy in POLICIES {
            let first = assign_teams(&participants, 3, policy, &mut StdRng::seed_from_u64(42));
            let second = assign_teams(&participants, 3, policy, &mut StdRng::seed_from_u64(42));
            assert_eq!(first, second);
        }
    }

    #[test]
    fn random_runs_with_different_seeds_keep_parity() {
        let participants = with_skills(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0]);

        for seed in [11, 12] {
            let mut rng = StdRng::seed_from_u64(seed);
            let teams = assign_teams(&participants, 2, Policy::Random, &mut rng).unwrap();
            assert_eq!(sizes(&teams), vec![5, 5]);
            assert_totals_match(&teams);
        }
    }

    #[test]
    fn balanced_closes_the_gap_on_even_skills() {
        let participants = with_skills(&[10.0, 8.0, 6.0, 4.0, 2.0, 0.0]);

        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let teams = assign_teams(&participants, 2, Policy::Balanced, &mut rng).unwrap();

            assert_eq!(sizes(&teams), vec![3, 3]);
            assert_totals_match(&teams);

            let first = teams[0].average_skill().unwrap();
            let second = teams[1].average_skill().unwrap();
            assert!((first - second).abs() < BALANCE_TOLERANCE, "seed={seed}");
        }
    }

    #[test]
    fn refinement_stops_within_the_cap() {
        for seed in 0..40 {
            let mut rng = StdRng::seed_from_u64(seed);
            let participants: Vec<Participant> = (0..rng.random_range(0..30))
                .map(|id| participant(id, Some(f64::from(rng.random_range(0..=20_u8)))))
                .collect();
            let team_count = rng.random_range(2..=6);

            let mut teams = empty_teams(team_count);
            let mut shuffled = participants.clone();
            shuffled.shuffle(&mut rng);
            allocate_by_headcount(&mut teams, shuffled);

            let swaps = refine_balance(&mut teams);
            assert!(swaps <= MAX_REFINEMENT_ITERATIONS);
            assert_totals_match(&teams);

            if swaps < MAX_REFINEMENT_ITERATIONS {
                if let Some((high, low, gap)) = widest_gap(&teams) {
                    assert!(
                        gap < BALANCE_TOLERANCE || best_swap(&teams[high], &teams[low], gap).is_none(),
                        "seed={seed} stopped early with an improving swap left"
                    );
                }
            }
        }
    }

    #[test]
    fn refinement_swaps_in_place() {
        let mut teams = empty_teams(2);
        allocate_by_headcount(&mut teams, with_skills(&[9.0, 8.0, 1.0, 0.0]));

        assert_eq!(refine_balance(&mut teams), 1);
        assert_totals_match(&teams);

        // {9, 8} vs {1, 0}: swapping 9 for 1 or 8 for 0 both leave a gap of 0,
        // the first one found wins and lands in the same member slot.
        let first: Vec<&str> = teams[0].members.iter().map(|m| m.id.as_str()).collect();
        let second: Vec<&str> = teams[1].members.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(first, vec!["participant_2", "participant_1"]);
        assert_eq!(second, vec!["participant_0", "participant_3"]);
    }

    #[test]
    fn empty_teams_are_never_max_or_min() {
        let mut teams = empty_teams(3);
        teams[1].members.push(participant(0, Some(4.0)));
        teams[1].total_skill = 4.0;

        assert_eq!(widest_gap(&teams), Some((1, 1, 0.0)));
        assert_eq!(refine_balance(&mut teams), 0);
        assert_eq!(widest_gap(&empty_teams(2)), None);
    }

    #[test]
    fn missing_skill_counts_as_zero() {
        let participants = vec![
            participant(0, None),
            participant(1, Some(6.0)),
            participant(2, None),
            participant(3, Some(6.0)),
        ];
        let mut rng = StdRng::seed_from_u64(5);
        let teams = assign_teams(&participants, 2, Policy::Balanced, &mut rng).unwrap();

        assert_eq!(teams[0].total_skill, 6.0);
        assert_eq!(teams[1].total_skill, 6.0);
        let unrated = teams
            .iter()
            .flat_map(|team| &team.members)
            .filter(|member| member.skill.is_none())
            .count();
        assert_eq!(unrated, 2);
    }

    #[test]
    fn mixed_spreads_each_band_over_the_teams() {
        let participants = with_skills(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);

        for seed in 0..10 {
            let mut rng = StdRng::seed_from_u64(seed);
            let teams = assign_teams(&participants, 3, Policy::Mixed, &mut rng).unwrap();
            assert_eq!(sizes(&teams), vec![3, 3, 3]);
            assert_totals_match(&teams);

            for team in &teams {
                let mut bands: Vec<i64> = team.members.iter().map(skill_band).collect();
                bands.sort_unstable();
                assert_eq!(bands, vec![0, 3, 6]);
            }
        }
    }

    #[test]
    fn mixed_may_break_headcount_parity() {
        // One member per band: each band's only member goes to slot 0.
        let participants = with_skills(&[1.0, 4.0, 7.5]);
        let mut rng = StdRng::seed_from_u64(9);
        let teams = assign_teams(&participants, 2, Policy::Mixed, &mut rng).unwrap();

        assert_eq!(sizes(&teams), vec![3, 0]);
        assert_eq!(teams[0].total_skill, 12.5);
        assert_eq!(teams[1].total_skill, 0.0);
    }

    #[test]
    fn huge_skills_keep_totals_consistent() {
        // 1e17 swallows the small skills while it is part of a running total.
        let participants = with_skills(&[1e17, 1.0, 1.0, 0.0, 0.0, 0.0]);

        for policy in POLICIES {
            for seed in 0..20 {
                let mut rng = StdRng::seed_from_u64(seed);
                let teams = assign_teams(&participants, 3, policy, &mut rng).unwrap();
                assert!(totals_consistent(&teams), "policy={policy} seed={seed}");
                assert_eq!(teams.iter().map(|team| team.members.len()).sum::<usize>(), 6);
            }
        }
    }

    #[test]
    fn a_wrong_total_is_caught() {
        let mut teams = empty_teams(2);
        allocate_by_headcount(&mut teams, with_skills(&[4.0, 5.0, 6.0, 7.0]));
        assert!(totals_consistent(&teams));

        teams[1].total_skill += 0.5;
        assert!(!totals_consistent(&teams));
    }

    #[test]
    fn skill_bands_are_three_wide() {
        assert_eq!(skill_band(&participant(0, None)), 0);
        assert_eq!(skill_band(&participant(0, Some(2.9))), 0);
        assert_eq!(skill_band(&participant(0, Some(3.0))), 3);
        assert_eq!(skill_band(&participant(0, Some(8.0))), 6);
        assert_eq!(skill_band(&participant(0, Some(10.0))), 9);
    }

    #[test]
    fn stamping_follows_membership() {
        let mut participants = with_skills(&[1.0, 2.0, 3.0]);
        participants[2].team_assigned = Some("Old Team".to_string());
        let mut rng = StdRng::seed_from_u64(2);
        let teams = assign_teams(&participants[..2], 2, Policy::Random, &mut rng).unwrap();

        stamp_team_assignments(&mut participants, &teams);

        for team in &teams {
            for member in &team.members {
                let stamped = participants.iter().find(|p| p.id == member.id).unwrap();
                assert_eq!(stamped.team_assigned.as_deref(), Some(team.name.as_str()));
            }
        }
        assert_eq!(participants[2].team_assigned, None);
    }
}
