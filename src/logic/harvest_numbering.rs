use crate::error::{LineageError, Result};
use crate::model::{HarvestNumbering, Id};
use crate::store::traits::HarvestStore;

/// Number the next harvest of a cross would get without an explicit number.
///
/// This is advisory only: it reads the cross's high-water mark outside any
/// transaction. `insert_harvest` resolves the number again under a row lock
/// and the `(breeding_record_id, harvest_number)` constraint decides.
pub async fn next_harvest_number<S>(store: &S, cross_id: &Id) -> Result<i32>
where
    S: HarvestStore + ?Sized,
{
    let high_water = store
        .harvest_high_water(cross_id)
        .await?
        .ok_or_else(|| LineageError::not_found("cross", cross_id.clone()))?;
    HarvestNumbering::Next.resolve(high_water)
}
