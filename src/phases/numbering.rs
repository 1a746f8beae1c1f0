// Lot numbering and final ordering.
//
// Sticker-provided numbers drive the order when present; detection order is
// preserved otherwise. Catalogue/mixed lots are numbered earlier, right
// after remapping, with a counter that runs across segments.

use crate::core::types::Lot;

/// Extract a numeric lot number from a sticker value: the literal when
/// numeric, the first digit run when a string.
pub fn parse_lot_number(value: Option<&serde_json::Value>) -> Option<u64> {
    match value? {
        serde_json::Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        serde_json::Value::String(s) => {
            let digits: String = s
                .chars()
                .skip_while(|c| !c.is_ascii_digit())
                .take_while(|c| c.is_ascii_digit())
                .collect();
            digits.parse().ok()
        }
        _ => None,
    }
}

/// Early numbering for catalogue/mixed lots: sticker numbers win, the rest
/// get a running counter that continues across segments so filenames never
/// collide between two catalogue segments.
pub fn assign_catalogue_numbers(lots: &mut [Lot]) {
    let used: std::collections::HashSet<u64> = lots
        .iter()
        .filter(|l| l.sub_mode.map(|m| m.is_catalogue_like()).unwrap_or(false))
        .filter_map(|l| l.lot_number)
        .collect();

    let mut next = 1u64;
    for lot in lots.iter_mut() {
        let catalogue_like = lot.sub_mode.map(|m| m.is_catalogue_like()).unwrap_or(false);
        if !catalogue_like || lot.lot_number.is_some() {
            continue;
        }
        while used.contains(&next) {
            next += 1;
        }
        lot.lot_number = Some(next);
        next += 1;
    }
}

/// Final ordering: numbered lots ascending, then unnumbered lots, each group
/// preserving its original relative order. The unnumbered tail is then
/// assigned numbers continuing after the highest sticker number, since the
/// rename planner needs one for every lot.
pub fn order_and_number(lots: Vec<Lot>) -> Vec<Lot> {
    let (mut numbered, unnumbered): (Vec<Lot>, Vec<Lot>) =
        lots.into_iter().partition(|l| l.lot_number.is_some());

    // sort_by_key is stable: equal numbers keep detection order
    numbered.sort_by_key(|l| l.lot_number.unwrap_or(u64::MAX));

    let mut next = numbered
        .iter()
        .filter_map(|l| l.lot_number)
        .max()
        .unwrap_or(0)
        + 1;

    let mut ordered = numbered;
    for mut lot in unnumbered {
        lot.lot_number = Some(next);
        next += 1;
        ordered.push(lot);
    }
    ordered
}
