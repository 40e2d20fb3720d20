use crate::board::Board;

pub const CURVE_SIZE: u8 = 5;

pub const CURVE: [u8; CURVE_SIZE as usize + 1] = [0, 1, 4, 16, 64, 255];

pub fn duty(position: u8) -> u8 {
    CURVE[usize::from(position.min(CURVE_SIZE))]
}

pub fn apply<B: Board + ?Sized>(board: &mut B, position: u8) -> u8 {
    let duty = duty(position);
    board.set_duty(duty);
    duty
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedBoard;

    #[test]
    fn endpoints_are_dark_and_full_scale() {
        assert_eq!(duty(0), 0);
        assert_eq!(duty(CURVE_SIZE), u8::MAX);
    }

    #[test]
    fn table_is_monotonic() {
        assert!(CURVE.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn out_of_range_positions_clamp_to_maximum() {
        for position in CURVE_SIZE..=u8::MAX {
            assert_eq!(duty(position), duty(CURVE_SIZE));
        }
    }

    #[test]
    fn apply_writes_the_resolved_duty() {
        let mut board = ScriptedBoard::new();

        assert_eq!(apply(&mut board, 3), 16);
        assert_eq!(apply(&mut board, 200), 255);

        assert_eq!(board.duties, vec![16, 255]);
    }
}
