/// Set of terminal symbols, indexed by terminal id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TerminalSet
{	data: Vec<bool>,
}
impl TerminalSet
{	pub fn new(size: usize) -> Self
	{	Self {data: vec![false; size]}
	}

	pub fn contains(&self, element: usize) -> bool
	{	*self.data.get(element).unwrap_or(&false)
	}

	/// Returns true if the element was not in the set before.
	pub fn add(&mut self, element: usize) -> bool
	{	match self.data.get_mut(element)
		{	Some(v) if !*v =>
			{	*v = true;
				true
			}
			_ => false
		}
	}

	/// Add all elements of `other`. Returns true if anything changed.
	pub fn union(&mut self, other: &TerminalSet) -> bool
	{	let mut changed = false;
		for (i, v) in self.data.iter_mut().enumerate()
		{	if !*v && other.contains(i)
			{	changed = true;
				*v = true;
			}
		}
		changed
	}

	pub fn iter(&self) -> impl Iterator<Item=usize> + '_
	{	self.data.iter().enumerate().filter(|(_, v)| **v).map(|(i, _)| i)
	}
}
