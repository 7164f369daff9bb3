// Physical header pin -> BCM gpio, indexed by header pin. -1 marks power,
// ground and unpopulated pins.
const REV1: [i8; 41] = [
    -1, -1, -1, 0, -1, 1, -1, 4, 14, -1, 15, 17, 18, 21, -1, 22, 23, -1, 24, 10, -1, 9, 25, 11, 8,
    -1, 7, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1,
];
const REV2: [i8; 41] = [
    -1, -1, -1, 2, -1, 3, -1, 4, 14, -1, 15, 17, 18, 27, -1, 22, 23, -1, 24, 10, -1, 9, 25, 11, 8,
    -1, 7, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1,
];
const REV3: [i8; 41] = [
    -1, -1, -1, 2, -1, 3, -1, 4, 14, -1, 15, 17, 18, 27, -1, 22, 23, -1, 24, 10, -1, 9, 25, 11, 8,
    -1, 7, -1, -1, 5, -1, 6, 12, 13, -1, 19, 16, 26, 20, -1, 21,
];

/// Translates a physical header pin to its BCM number for the given board
/// revision. Revisions above 2 share the 40-pin layout.
pub fn board_to_bcm(pin: u8, revision: u8) -> Option<u8> {
    let table = match revision {
        1 => &REV1,
        2 => &REV2,
        _ => &REV3,
    };
    table
        .get(usize::from(pin))
        .copied()
        .filter(|bcm| *bcm >= 0)
        .map(|bcm| bcm as u8)
}
