use crate::pir_internals::{
    branch_opt_util,
    error::VpirError,
    field::{self, Element},
    fss::{CorrectionWord, VectorKey},
    params::MAX_FSS_BIT_WIDTH,
    prg::BLOCK_BYTE_LEN,
};

const CW_BYTE_LEN: usize = BLOCK_BYTE_LEN + 2;
const KEY_HEADER_BYTE_LEN: usize = BLOCK_BYTE_LEN + 2;

/// Encodes a field vector as fixed-width big-endian elements.
pub fn elements_to_bytes(elements: &[Element]) -> Vec<u8> {
    let mut out = vec![0u8; elements.len() * field::BYTES];

    for (element, chunk) in elements.iter().zip(out.chunks_exact_mut(field::BYTES)) {
        chunk.copy_from_slice(&element.to_bytes());
    }

    out
}

/// Decodes a field vector; the byte length must be a multiple of the
/// element width. Off-range words are reduced into the field.
pub fn bytes_to_elements(bytes: &[u8]) -> Result<Vec<Element>, VpirError> {
    if branch_opt_util::unlikely(bytes.len() % field::BYTES != 0) {
        return Err(VpirError::InvalidQueryLength {
            expected: bytes.len().next_multiple_of(field::BYTES),
            got: bytes.len(),
        });
    }

    Ok(bytes.chunks_exact(field::BYTES).map(Element::set_bytes).collect())
}

/// Encodes a vector point function key as
/// `s_init(16) ‖ t_init(1) ‖ num_bits(1) ‖ num_bits × (cw_s(16) ‖ t_left(1) ‖ t_right(1)) ‖ final_len: u32 BE ‖ final coordinates`.
pub fn vector_key_to_bytes(key: &VectorKey) -> Vec<u8> {
    let mut out = Vec::with_capacity(KEY_HEADER_BYTE_LEN + key.cw.len() * CW_BYTE_LEN + 4 + key.final_cw.len() * field::BYTES);

    out.extend_from_slice(&key.s_init);
    out.push(key.t_init);
    out.push(key.cw.len() as u8);

    for word in key.cw.iter() {
        out.extend_from_slice(&word.s);
        out.push(word.t_left);
        out.push(word.t_right);
    }

    out.extend_from_slice(&(key.final_cw.len() as u32).to_be_bytes());
    out.extend_from_slice(&elements_to_bytes(&key.final_cw));

    out
}

/// Decodes a vector point function key, validating every length field.
pub fn vector_key_from_bytes(bytes: &[u8]) -> Result<VectorKey, VpirError> {
    if branch_opt_util::unlikely(bytes.len() < KEY_HEADER_BYTE_LEN) {
        return Err(VpirError::MalformedFssKey);
    }

    let mut s_init = [0u8; BLOCK_BYTE_LEN];
    s_init.copy_from_slice(&bytes[..BLOCK_BYTE_LEN]);

    let t_init = bytes[BLOCK_BYTE_LEN];
    if branch_opt_util::unlikely(t_init > 1) {
        return Err(VpirError::MalformedFssKey);
    }

    let num_bits = bytes[BLOCK_BYTE_LEN + 1] as usize;
    if branch_opt_util::unlikely(!(1..=MAX_FSS_BIT_WIDTH).contains(&num_bits)) {
        return Err(VpirError::InvalidBitWidth(num_bits));
    }

    let cw_section_end = KEY_HEADER_BYTE_LEN + num_bits * CW_BYTE_LEN;
    if branch_opt_util::unlikely(bytes.len() < cw_section_end + 4) {
        return Err(VpirError::MalformedFssKey);
    }

    let cw = bytes[KEY_HEADER_BYTE_LEN..cw_section_end]
        .chunks_exact(CW_BYTE_LEN)
        .map(|chunk| {
            let mut s = [0u8; BLOCK_BYTE_LEN];
            s.copy_from_slice(&chunk[..BLOCK_BYTE_LEN]);
            CorrectionWord {
                s,
                t_left: chunk[BLOCK_BYTE_LEN],
                t_right: chunk[BLOCK_BYTE_LEN + 1],
            }
        })
        .collect::<Vec<CorrectionWord>>();

    if branch_opt_util::unlikely(cw.iter().any(|word| word.t_left > 1 || word.t_right > 1)) {
        return Err(VpirError::MalformedFssKey);
    }

    let final_len = u32::from_be_bytes(bytes[cw_section_end..cw_section_end + 4].try_into().unwrap()) as usize;
    let final_section = &bytes[cw_section_end + 4..];

    if branch_opt_util::unlikely(final_section.len() != final_len * field::BYTES) {
        return Err(VpirError::MalformedFssKey);
    }

    let final_cw = bytes_to_elements(final_section)?;

    Ok(VectorKey {
        s_init,
        t_init,
        cw,
        final_cw,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::pir_internals::fss::Fss;

    #[test]
    fn element_vector_codec_round_trips() {
        let elements: Vec<Element> = (0..100).map(|i| Element::from_u32(i * 0x0101_0101)).collect();
        let bytes = elements_to_bytes(&elements);

        assert_eq!(bytes.len(), elements.len() * field::BYTES);
        assert_eq!(bytes_to_elements(&bytes).unwrap(), elements);

        assert!(bytes_to_elements(&bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn vector_key_codec_round_trips() {
        let fss = Fss::new(11).unwrap();
        let value: Vec<Element> = (1..=5).map(Element::from_u32).collect();
        let [key0, key1] = fss.generate_vector(1027, &value);

        for key in [key0, key1] {
            let bytes = vector_key_to_bytes(&key);
            assert_eq!(vector_key_from_bytes(&bytes).unwrap(), key);
        }
    }

    #[test]
    fn malformed_keys_are_rejected() {
        let fss = Fss::new(4).unwrap();
        let [key, _] = fss.generate_vector(9, &[Element::one()]);
        let bytes = vector_key_to_bytes(&key);

        assert_eq!(vector_key_from_bytes(&bytes[..10]).err(), Some(VpirError::MalformedFssKey));
        assert_eq!(vector_key_from_bytes(&bytes[..bytes.len() - 1]).err(), Some(VpirError::MalformedFssKey));

        let mut extended = bytes.clone();
        extended.push(0);
        assert_eq!(vector_key_from_bytes(&extended).err(), Some(VpirError::MalformedFssKey));

        let mut zero_bits = bytes.clone();
        zero_bits[BLOCK_BYTE_LEN + 1] = 0;
        assert_eq!(vector_key_from_bytes(&zero_bits).err(), Some(VpirError::InvalidBitWidth(0)));

        let mut bad_t = bytes;
        bad_t[BLOCK_BYTE_LEN] = 2;
        assert_eq!(vector_key_from_bytes(&bad_t).err(), Some(VpirError::MalformedFssKey));
    }
}
