use super::{
    test_builder::TestDataSource,
    *,
};

use test_case::test_case;

#[test_case(
    TestDataSource {
        remote_latest: 105,
        local_relayed: 100,
    } => Some(101..=105); "behind so needs to relay"
)]
#[test_case(
    TestDataSource {
        remote_latest: 101,
        local_relayed: 100,
    } => Some(101..=101); "one behind"
)]
#[test_case(
    TestDataSource {
        remote_latest: 100,
        local_relayed: 100,
    } => None; "same so doesn't need to relay"
)]
#[test_case(
    TestDataSource {
        remote_latest: 90,
        local_relayed: 100,
    } => None; "source behind the light client"
)]
#[test_case(
    TestDataSource {
        remote_latest: u64::MAX,
        local_relayed: u64::MAX,
    } => None; "no height above the last one"
)]
#[tokio::test]
async fn test_needs_to_relay(state: TestDataSource) -> Option<RangeInclusive<u64>> {
    build(&state).await.unwrap().needs_to_relay().map(Into::into)
}

#[test_case(RelayGap::new(101, 105), 0 => None; "0 page size results in no page")]
#[test_case(RelayGap::new(101, 105), 1 => Some((101, 101)); "page of one")]
#[test_case(RelayGap::new(101, 105), 5 => Some((101, 105)); "page matches gap")]
#[test_case(RelayGap::new(101, 105), 32 => Some((101, 105)); "page larger than gap")]
#[test_case(RelayGap::new(101, 105), 2 => Some((101, 102)); "page shrinks the gap")]
#[test_case(RelayGap::new(u64::MAX, u64::MAX), 2 => Some((u64::MAX, u64::MAX)); "page at the end of the range")]
fn test_page(gap: RelayGap, size: u64) -> Option<(u64, u64)> {
    let page = gap.page(size)?;
    Some((page.oldest(), page.latest()))
}

#[test]
fn heights_are_in_order() {
    let heights: Vec<u64> = RelayGap::new(3, 6).heights().map(|h| *h).collect();
    assert_eq!(heights, vec![3, 4, 5, 6]);
}
