use std::{num::NonZeroUsize, slice::Chunks};

/// Splits `items` into consecutive batches of `size`, in order; only the last one may be shorter.
pub fn split<T>(items: &[T], size: NonZeroUsize) -> Chunks<'_, T> {
	items.chunks(size.get())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn size(n: usize) -> NonZeroUsize {
		NonZeroUsize::new(n).unwrap()
	}

	#[test]
	fn concatenation_restores_input() {
		for len in [0_usize, 1, 199, 200, 201, 450] {
			let items = (0..len).collect::<Vec<_>>();

			for batch_size in [1, 3, 200, 1000] {
				let batches = split(&items, size(batch_size)).collect::<Vec<_>>();

				assert_eq!(batches.concat(), items);
				assert_eq!(batches.len(), len.div_ceil(batch_size));

				// only the last batch may be short
				if let Some((_, full)) = batches.split_last() {
					assert!(full.iter().all(|b| b.len() == batch_size));
				}
			}
		}
	}

	#[test]
	fn default_sized_batches() {
		let items = vec![(); 450];

		let sizes = split(&items, size(200)).map(<[()]>::len).collect::<Vec<_>>();

		assert_eq!(sizes, [200, 200, 50]);
	}
}
